//! Scrolling "do not touch" marquee shown while the login runs.
//!
//! The parent re-executes itself with the hidden `banner` subcommand in a new
//! console window and kills that child when the run ends. The child draws the
//! text with the 8x8 bitmap font between two hazard stripes.

use std::env;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{GrayImage, Luma};
use tracing::debug;

pub const BANNER_COMMAND: &str = "banner";

const FRAME_INTERVAL: Duration = Duration::from_millis(40);
const FRAME_WIDTH: usize = 119;
const GAP_COLUMNS: usize = 16;
const STRIPE_PERIOD: usize = 8;
const INK: char = '█';
const STRIPE: char = '▞';

/// Rasterizes `text` into an 8 pixel high strip followed by a blank gap, so the
/// marquee wraps without the ends touching. Glyphs outside the basic font
/// render as `?`.
pub fn render_strip(text: &str) -> GrayImage {
    let chars: Vec<char> = text.chars().collect();
    let width = chars.len() * 8 + GAP_COLUMNS;
    let mut strip = GrayImage::new(width as u32, 8);
    for (index, ch) in chars.iter().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(*ch).or_else(|| BASIC_FONTS.get('?')) else {
            continue;
        };
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8 {
                if (bits >> col) & 1 == 1 {
                    strip.put_pixel((index * 8 + col) as u32, row as u32, Luma([255]));
                }
            }
        }
    }
    strip
}

/// One frame: a stripe row, eight text rows and a stripe row, each exactly
/// `width` characters, starting `offset` columns into the strip.
pub fn render_frame(strip: &GrayImage, offset: usize, width: usize) -> Vec<String> {
    let strip_width = strip.width() as usize;
    let mut rows = Vec::with_capacity(strip.height() as usize + 2);
    rows.push(stripe_row(offset, width));
    for y in 0..strip.height() {
        let row = (0..width)
            .map(|x| {
                let sx = ((x + offset) % strip_width) as u32;
                if strip.get_pixel(sx, y)[0] > 0 {
                    INK
                } else {
                    ' '
                }
            })
            .collect();
        rows.push(row);
    }
    rows.push(stripe_row(offset, width));
    rows
}

fn stripe_row(offset: usize, width: usize) -> String {
    (0..width)
        .map(|x| {
            if (x + offset) % STRIPE_PERIOD < STRIPE_PERIOD / 2 {
                STRIPE
            } else {
                ' '
            }
        })
        .collect()
}

/// Child side: draws frames until the console goes away or the parent kills us.
pub fn run(text: &str) -> io::Result<()> {
    prepare_console(text);
    let strip = render_strip(text);
    let period = strip.width() as usize;
    let mut stdout = io::stdout().lock();
    write!(stdout, "\x1b[?25l\x1b[2J")?;

    let mut offset = 0;
    loop {
        let frame = render_frame(&strip, offset, FRAME_WIDTH);
        write!(stdout, "\x1b[H\n\n{}", frame.join("\n"))?;
        stdout.flush()?;
        thread::sleep(FRAME_INTERVAL);
        offset = (offset + 1) % period;
    }
}

#[cfg(target_os = "windows")]
fn prepare_console(title: &str) {
    use windows::core::{HSTRING, PCWSTR};
    use windows::Win32::System::Console::{
        GetConsoleMode, GetConsoleWindow, GetStdHandle, SetConsoleMode, SetConsoleTitleW,
        CONSOLE_MODE, ENABLE_VIRTUAL_TERMINAL_PROCESSING, STD_OUTPUT_HANDLE,
    };

    let title = HSTRING::from(title);
    unsafe {
        let _ = SetConsoleTitleW(PCWSTR(title.as_ptr()));
        if !pin_topmost(GetConsoleWindow()) {
            debug!("banner console could not be kept above other windows");
        }
        let Ok(handle) = GetStdHandle(STD_OUTPUT_HANDLE) else {
            return;
        };
        let mut mode = CONSOLE_MODE::default();
        if GetConsoleMode(handle, &mut mode).is_ok() {
            let _ = SetConsoleMode(handle, mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING);
        }
    }
}

/// Keeps `hwnd` above non-topmost windows such as a fullscreen EasiNote,
/// without stealing focus from it.
#[cfg(target_os = "windows")]
fn pin_topmost(hwnd: windows::Win32::Foundation::HWND) -> bool {
    use windows::Win32::UI::WindowsAndMessaging::{
        SetWindowPos, HWND_TOPMOST, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE,
    };

    if hwnd.is_invalid() {
        return false;
    }
    let flags = SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE;
    unsafe { SetWindowPos(hwnd, HWND_TOPMOST, 0, 0, 0, 0, flags).is_ok() }
}

#[cfg(not(target_os = "windows"))]
fn prepare_console(_title: &str) {}

/// Kills the banner process when dropped.
pub struct BannerGuard {
    child: Child,
}

impl BannerGuard {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

impl Drop for BannerGuard {
    fn drop(&mut self) {
        if let Err(err) = self.child.kill() {
            debug!(error = %err, "banner already gone");
        }
        let _ = self.child.wait();
    }
}

pub fn banner_command(exe: &Path, text: &str) -> Command {
    let mut cmd = Command::new(exe);
    cmd.arg(BANNER_COMMAND)
        .arg("--text")
        .arg(text)
        .stdin(Stdio::null());
    cmd
}

/// Starts the banner in its own console. Failures are logged and the run
/// continues without it.
#[cfg(target_os = "windows")]
pub fn spawn(text: &str) -> Option<BannerGuard> {
    use std::os::windows::process::CommandExt;
    const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;

    let exe = match env::current_exe() {
        Ok(exe) => exe,
        Err(err) => {
            tracing::warn!(error = %err, "cannot locate own executable, banner skipped");
            return None;
        }
    };
    match banner_command(&exe, text)
        .creation_flags(CREATE_NEW_CONSOLE)
        .spawn()
    {
        Ok(child) => {
            debug!(pid = child.id(), "banner started");
            Some(BannerGuard::new(child))
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to start banner");
            None
        }
    }
}

#[cfg(not(target_os = "windows"))]
pub fn spawn(_text: &str) -> Option<BannerGuard> {
    let exe = env::current_exe().ok();
    debug!(?exe, "banner needs a separate console window, skipped on this platform");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_has_one_column_per_glyph_bit_plus_gap() {
        let strip = render_strip("HI");
        assert_eq!(strip.dimensions(), (2 * 8 + GAP_COLUMNS as u32, 8));
        // Left edge of 'H' is set on every row but the last.
        assert_eq!(strip.get_pixel(0, 0)[0], 255);
        assert_eq!(strip.get_pixel(0, 7)[0], 0);
        assert!((16..strip.width()).all(|x| (0..8).all(|y| strip.get_pixel(x, y)[0] == 0)));
    }

    #[test]
    fn unknown_glyphs_fall_back_to_question_mark() {
        assert_eq!(render_strip("白"), render_strip("?"));
    }

    #[test]
    fn frame_rows_are_exactly_as_wide_as_requested() {
        let strip = render_strip("WARNING");
        let frame = render_frame(&strip, 3, 40);
        assert_eq!(frame.len(), 10);
        assert!(frame.iter().all(|row| row.chars().count() == 40));
        assert!(frame[0].contains(STRIPE));
        assert_eq!(frame[0], frame[9]);
    }

    #[test]
    fn scrolling_shifts_one_column_and_wraps() {
        let strip = render_strip("AB");
        let period = strip.width() as usize;
        let first = render_frame(&strip, 0, 50);
        let next = render_frame(&strip, 1, 50);
        for (a, b) in first.iter().zip(&next) {
            let a: Vec<char> = a.chars().collect();
            let b: Vec<char> = b.chars().collect();
            assert_eq!(&a[1..], &b[..49]);
        }
        assert_eq!(render_frame(&strip, period, 50), first);
    }

    #[test]
    fn command_reenters_hidden_subcommand() {
        let cmd = banner_command(Path::new("easinote-login"), "hello");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["banner", "--text", "hello"]);
    }

    #[cfg(target_os = "windows")]
    #[test]
    fn pinning_without_a_console_window_reports_failure() {
        use windows::Win32::Foundation::HWND;
        assert!(!pin_topmost(HWND::default()));
    }

    #[cfg(unix)]
    #[test]
    fn guard_kills_child_on_drop() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id().to_string();
        drop(BannerGuard::new(child));
        let alive = Command::new("kill")
            .args(["-0", &pid])
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(!alive.success());
    }
}
