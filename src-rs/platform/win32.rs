use std::mem;
use std::thread;
use std::time::Duration;

use image::RgbaImage;
use tracing::{debug, warn};
use windows::Win32::Foundation::{BOOL, FALSE, HWND, LPARAM, TRUE};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, KEYEVENTF_UNICODE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEINPUT,
    VIRTUAL_KEY, VK_BACK, VK_CONTROL,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowTextW, IsWindowVisible, SetCursorPos, SetForegroundWindow,
    SetProcessDPIAware, ShowWindow, SW_RESTORE,
};

use super::{Backend, Key};
use crate::error::PlatformError;
use crate::layout::Point;

const CLICK_SETTLE: Duration = Duration::from_millis(50);

pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        // Template coordinates are physical pixels; without this the cursor
        // lands on DPI-scaled positions.
        unsafe {
            if !SetProcessDPIAware().as_bool() {
                warn!("SetProcessDPIAware failed; coordinates may be scaled");
            }
        }
        Self
    }
}

fn virtual_key(key: Key) -> VIRTUAL_KEY {
    match key {
        Key::Ctrl => VK_CONTROL,
        Key::A => VIRTUAL_KEY(0x41),
        Key::Backspace => VK_BACK,
    }
}

fn keyboard_input(vk: VIRTUAL_KEY, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send(inputs: &[INPUT], what: &str) -> Result<(), PlatformError> {
    let sent = unsafe { SendInput(inputs, mem::size_of::<INPUT>() as i32) };
    if sent as usize == inputs.len() {
        Ok(())
    } else {
        Err(PlatformError::Input(format!(
            "{what}: SendInput accepted {sent}/{} events",
            inputs.len()
        )))
    }
}

impl Backend for WindowsBackend {
    fn capture(&mut self) -> Result<RgbaImage, PlatformError> {
        let monitors = xcap::Monitor::all().map_err(|e| PlatformError::Capture(e.to_string()))?;
        let monitor = monitors
            .iter()
            .find(|m| m.is_primary())
            .or_else(|| monitors.first())
            .ok_or_else(|| PlatformError::Capture("no monitor found".to_string()))?;
        let shot = monitor
            .capture_image()
            .map_err(|e| PlatformError::Capture(e.to_string()))?;
        let (w, h) = (shot.width(), shot.height());
        RgbaImage::from_raw(w, h, shot.into_raw())
            .ok_or_else(|| PlatformError::Capture("capture buffer size mismatch".to_string()))
    }

    fn click(&mut self, at: Point) -> Result<(), PlatformError> {
        unsafe { SetCursorPos(at.x, at.y) }
            .map_err(|e| PlatformError::Input(format!("SetCursorPos: {e}")))?;
        thread::sleep(CLICK_SETTLE);

        let button = |flags| INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx: 0,
                    dy: 0,
                    mouseData: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };
        send(
            &[button(MOUSEEVENTF_LEFTDOWN), button(MOUSEEVENTF_LEFTUP)],
            "click",
        )
    }

    fn key_down(&mut self, key: Key) -> Result<(), PlatformError> {
        send(
            &[keyboard_input(virtual_key(key), 0, KEYBD_EVENT_FLAGS(0))],
            "key down",
        )
    }

    fn key_up(&mut self, key: Key) -> Result<(), PlatformError> {
        send(
            &[keyboard_input(virtual_key(key), 0, KEYEVENTF_KEYUP)],
            "key up",
        )
    }

    fn type_text(&mut self, text: &str) -> Result<(), PlatformError> {
        for unit in text.encode_utf16() {
            send(
                &[
                    keyboard_input(VIRTUAL_KEY(0), unit, KEYEVENTF_UNICODE),
                    keyboard_input(VIRTUAL_KEY(0), unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP),
                ],
                "type",
            )?;
        }
        Ok(())
    }

    fn focus_window(&mut self, title: &str) -> Result<bool, PlatformError> {
        let Some(hwnd) = find_window_containing(title) else {
            return Ok(false);
        };
        debug!(hwnd = ?hwnd.0, "focusing window");
        unsafe {
            let _ = ShowWindow(hwnd, SW_RESTORE);
            if !SetForegroundWindow(hwnd).as_bool() {
                warn!("SetForegroundWindow refused for \"{title}\"");
            }
        }
        Ok(true)
    }
}

struct WindowSearch {
    needle: String,
    found: Option<HWND>,
}

unsafe extern "system" fn match_title(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let search = &mut *(lparam.0 as *mut WindowSearch);
    if !IsWindowVisible(hwnd).as_bool() {
        return TRUE;
    }
    let mut buf = [0u16; 512];
    let len = GetWindowTextW(hwnd, &mut buf);
    if len <= 0 {
        return TRUE;
    }
    let title = String::from_utf16_lossy(&buf[..len as usize]);
    if title.contains(&search.needle) {
        search.found = Some(hwnd);
        return FALSE;
    }
    TRUE
}

pub fn find_window_containing(title: &str) -> Option<HWND> {
    let mut search = WindowSearch {
        needle: title.to_string(),
        found: None,
    };
    unsafe {
        // Stopping early makes EnumWindows report an error; the result is in `search`.
        let _ = EnumWindows(
            Some(match_title),
            LPARAM(&mut search as *mut WindowSearch as isize),
        );
    }
    search.found
}
