use crate::config::Postprocess;
use unicode_normalization::UnicodeNormalization;

/// Clean up one page of recognized text. Every step is opt-in, so the default
/// config returns the engine's output untouched.
pub fn clean_page_text(cfg: &Postprocess, text: String) -> String {
    let mut text = text;

    if cfg.normalize_newlines {
        text = text.replace("\r\n", "\n");
    }

    if cfg.strip_form_feeds {
        // tesseract ends every page with a form feed.
        text.retain(|c| c != '\u{000C}');
    }

    if cfg.normalize_unicode {
        // NFC, not NFKC: compatibility folding would rewrite Bengali digits
        // and conjunct presentation forms.
        text = text.nfc().collect::<String>();
    }

    if cfg.trim_trailing_whitespace {
        let ends_with_newline = text.ends_with('\n');
        text = text
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        if ends_with_newline {
            text.push('\n');
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_identity() {
        let raw = "a  \r\nb\u{000C}".to_string();
        assert_eq!(clean_page_text(&Postprocess::default(), raw.clone()), raw);
    }

    #[test]
    fn all_steps_enabled() {
        let cfg = Postprocess {
            normalize_newlines: true,
            normalize_unicode: true,
            trim_trailing_whitespace: true,
            strip_form_feeds: true,
        };
        // "e" + combining acute composes to U+00E9 under NFC.
        let raw = "cafe\u{0301}  \r\nline\t\n\u{000C}".to_string();
        assert_eq!(clean_page_text(&cfg, raw), "caf\u{00E9}\nline\n");
    }
}
