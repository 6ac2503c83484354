use std::io;
use std::process::Command;

/// Hands a URL to whatever displays it.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Opens URLs with the platform's default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &str) -> io::Result<()> {
        #[cfg(target_os = "macos")]
        let cmd = {
            let mut cmd = Command::new("open");
            cmd.arg(url);
            cmd
        };
        #[cfg(target_os = "windows")]
        let cmd = {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", "", url]);
            cmd
        };
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let cmd = {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(url);
            cmd
        };

        run_opener(cmd)
    }
}

/// Runs the opener to completion so no child is left unreaped.
fn run_opener(mut cmd: Command) -> io::Result<()> {
    let status = cmd.status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("url opener exited with {}", status),
        ))
    }
}
