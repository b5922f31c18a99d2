use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::info;

pub const TITLE: &str = "EasiNote auto login";
pub const MESSAGE: &str = "EasiNote auto login is about to run.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Cancel,
}

/// Asks the user whether the automation may start. No answer within
/// `timeout` means proceed.
pub trait WarningPrompt {
    fn ask(&self, timeout: Duration) -> io::Result<Decision>;
}

/// Reads one line from stdin. Anything but an explicit no proceeds.
pub struct ConsolePrompt;

impl WarningPrompt for ConsolePrompt {
    fn ask(&self, timeout: Duration) -> io::Result<Decision> {
        let mut stderr = io::stderr();
        write!(
            stderr,
            "{MESSAGE}\nPress Enter to start now or type c to cancel (continuing in {}s): ",
            timeout.as_secs()
        )?;
        stderr.flush()?;

        let (tx, rx) = mpsc::channel();
        // The reader stays blocked on stdin after a timeout; it dies with the process.
        thread::spawn(move || {
            let mut line = String::new();
            let read = io::stdin().lock().read_line(&mut line).map(|_| line);
            let _ = tx.send(read);
        });

        match rx.recv_timeout(timeout) {
            Ok(line) => Ok(parse_answer(&line?)),
            Err(RecvTimeoutError::Timeout) => {
                writeln!(stderr)?;
                info!("no answer within {}s, continuing", timeout.as_secs());
                Ok(Decision::Proceed)
            }
            Err(RecvTimeoutError::Disconnected) => Ok(Decision::Proceed),
        }
    }
}

pub fn parse_answer(line: &str) -> Decision {
    match line.trim().to_ascii_lowercase().as_str() {
        "c" | "cancel" | "n" | "no" | "q" => Decision::Cancel,
        _ => Decision::Proceed,
    }
}

#[cfg(target_os = "windows")]
pub use message_box::MessageBoxPrompt;

#[cfg(target_os = "windows")]
mod message_box {
    use super::*;
    use windows::core::{w, HSTRING, PCWSTR};
    use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
    use windows::Win32::UI::WindowsAndMessaging::{
        FindWindowW, MessageBoxW, PostMessageW, IDCANCEL, IDOK, MB_ICONWARNING, MB_OKCANCEL,
        MB_SETFOREGROUND, MB_TOPMOST, MESSAGEBOX_RESULT, WM_COMMAND,
    };

    const PRESS_RETRY: Duration = Duration::from_millis(100);

    /// Topmost OK/Cancel box that presses OK by itself when the timeout elapses.
    pub struct MessageBoxPrompt;

    impl WarningPrompt for MessageBoxPrompt {
        fn ask(&self, timeout: Duration) -> io::Result<Decision> {
            let text = HSTRING::from(format!(
                "{MESSAGE}\n\nPress OK to start now or Cancel to abort.\nContinuing in {} seconds.",
                timeout.as_secs()
            ));
            let title = HSTRING::from(TITLE);

            let (done, wait) = mpsc::channel::<()>();
            let closer = thread::spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = wait.recv_timeout(timeout) {
                    // The dialog may not exist yet; keep trying until it is answered.
                    while !press_ok(TITLE) {
                        let answered = wait.recv_timeout(PRESS_RETRY);
                        if !matches!(answered, Err(RecvTimeoutError::Timeout)) {
                            break;
                        }
                    }
                }
            });

            let answer = unsafe {
                MessageBoxW(
                    HWND::default(),
                    PCWSTR(text.as_ptr()),
                    PCWSTR(title.as_ptr()),
                    MB_OKCANCEL | MB_ICONWARNING | MB_TOPMOST | MB_SETFOREGROUND,
                )
            };
            drop(done);
            let _ = closer.join();

            match answer {
                MESSAGEBOX_RESULT(0) => Err(io::Error::last_os_error()),
                IDCANCEL => Ok(Decision::Cancel),
                _ => Ok(Decision::Proceed),
            }
        }
    }

    /// Returns true once the OK press was posted to the dialog.
    fn press_ok(title: &str) -> bool {
        let title = HSTRING::from(title);
        unsafe {
            // "#32770" is the dialog window class MessageBoxW creates.
            match FindWindowW(w!("#32770"), PCWSTR(title.as_ptr())) {
                Ok(hwnd) => {
                    PostMessageW(hwnd, WM_COMMAND, WPARAM(IDOK.0 as usize), LPARAM(0)).is_ok()
                }
                Err(_) => false,
            }
        }
    }
}

#[cfg(target_os = "windows")]
pub fn system_prompt() -> Box<dyn WarningPrompt> {
    Box::new(MessageBoxPrompt)
}

#[cfg(not(target_os = "windows"))]
pub fn system_prompt() -> Box<dyn WarningPrompt> {
    Box::new(ConsolePrompt)
}
