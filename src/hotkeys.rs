//! Ctrl+Shift+S saves the most recent capture buffer for debugging,
//! Ctrl+Shift+D toggles the on-screen debug box. Two fixed bindings
//! registered with `RegisterHotKey`, serviced from a `GetMessage` loop on
//! their own thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use crate::model::OverlayCommand;
use crate::session::ManagerMsg;

#[cfg(windows)]
pub fn spawn(manager_tx: Sender<ManagerMsg>, overlay_tx: Sender<OverlayCommand>) {
    std::thread::spawn(move || platform::run(manager_tx, overlay_tx));
}

#[cfg(not(windows))]
pub fn spawn(_manager_tx: Sender<ManagerMsg>, _overlay_tx: Sender<OverlayCommand>) {
    tracing::warn!("global hotkeys are only wired up on Windows");
}

#[cfg(windows)]
mod platform {
    use super::*;
    use windows::Win32::Foundation::WPARAM;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, HOT_KEY_MODIFIERS, MOD_CONTROL, MOD_SHIFT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, GetMessageW, TranslateMessage, MSG, WM_HOTKEY,
    };

    const HOTKEY_DEBUG_SAVE: i32 = 1;
    const HOTKEY_DEBUG_BOX: i32 = 2;
    const VK_S: u32 = 0x53;
    const VK_D: u32 = 0x44;

    pub fn run(manager_tx: Sender<ManagerMsg>, overlay_tx: Sender<OverlayCommand>) {
        let debug_box_on = AtomicBool::new(false);

        unsafe {
            let modifiers = HOT_KEY_MODIFIERS(MOD_CONTROL.0 | MOD_SHIFT.0);
            if RegisterHotKey(None, HOTKEY_DEBUG_SAVE, modifiers, VK_S).is_err() {
                tracing::error!("failed to register debug-save hotkey");
                return;
            }
            if RegisterHotKey(None, HOTKEY_DEBUG_BOX, modifiers, VK_D).is_err() {
                tracing::error!("failed to register debug-box hotkey");
                return;
            }

            let mut msg = MSG::default();
            loop {
                if GetMessageW(&mut msg, None, 0, 0).as_bool() {
                    if msg.message == WM_HOTKEY {
                        handle_hotkey(msg.wParam, &manager_tx, &overlay_tx, &debug_box_on);
                    } else {
                        let _ = TranslateMessage(&msg);
                        DispatchMessageW(&msg);
                    }
                } else {
                    break;
                }
            }
        }
    }

    fn handle_hotkey(
        wparam: WPARAM,
        manager_tx: &Sender<ManagerMsg>,
        overlay_tx: &Sender<OverlayCommand>,
        debug_box_on: &AtomicBool,
    ) {
        match wparam.0 as i32 {
            HOTKEY_DEBUG_SAVE => {
                let _ = manager_tx.send(ManagerMsg::SaveDebugFrame);
            }
            HOTKEY_DEBUG_BOX => {
                let on = !debug_box_on.load(Ordering::SeqCst);
                debug_box_on.store(on, Ordering::SeqCst);
                let _ = overlay_tx.send(OverlayCommand::SetDebug(on));
            }
            _ => {}
        }
    }
}
