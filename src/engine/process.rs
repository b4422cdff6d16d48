use super::{CommandOutput, CommandRunner, Invocation};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Spawns real processes with `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, invocation: &Invocation) -> io::Result<CommandOutput> {
        debug!(
            "spawn {} {:?} timeout={:?}",
            program.display(),
            invocation.args_lossy(),
            invocation.timeout
        );
        let mut cmd = Command::new(program);
        cmd.args(&invocation.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        match invocation.timeout {
            Some(timeout) => wait_with_timeout(&mut child, timeout),
            None => {
                let output = child.wait_with_output()?;
                Ok(CommandOutput {
                    stdout: output.stdout,
                    stderr: output.stderr,
                    exit_code: output.status.code(),
                    timed_out: false,
                })
            }
        }
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<CommandOutput> {
    // Drain pipes while waiting so a chatty engine can't block on a full buffer.
    let stdout_thread = drain(child.stdout.take());
    let stderr_thread = drain(child.stderr.take());

    let start = Instant::now();
    let (status, timed_out) = loop {
        if let Some(status) = child.try_wait()? {
            break (status, false);
        }
        if start.elapsed() > timeout {
            warn!("process timed out after {:?}", timeout);
            let _ = child.kill();
            break (child.wait()?, true);
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    Ok(CommandOutput {
        stdout: join_reader(stdout_thread)?,
        stderr: join_reader(stderr_thread)?,
        exit_code: status.code(),
        timed_out,
    })
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = reader {
            r.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join_reader(handle: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    handle
        .join()
        .map_err(|_| io::Error::other("pipe reader thread panicked"))?
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_code() {
        let out = SystemRunner
            .run(Path::new("/bin/sh"), &Invocation::new(["-c", "printf hello; exit 3"]))
            .unwrap();
        assert_eq!(out.stdout_text(), "hello");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
    }

    #[test]
    fn kills_process_after_timeout() {
        let inv = Invocation::new(["-c", "exec sleep 5"])
            .with_timeout(Some(Duration::from_millis(200)));
        let out = SystemRunner.run(Path::new("/bin/sh"), &inv).unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[test]
    fn missing_program_is_an_error() {
        let res = SystemRunner.run(
            Path::new("/definitely/not/here/ocr"),
            &Invocation::new(Vec::<String>::new()),
        );
        assert!(res.is_err());
    }
}
