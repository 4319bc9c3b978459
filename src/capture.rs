//! On demand, produces a cropped JPEG-encoded image of a given screen
//! rectangle. The crop arithmetic is pure and platform-independent; pixel
//! acquisition is platform-specific (Win32 GDI: `BitBlt` into a memory DC,
//! then `GetDIBits` to read the pixels back).

use crate::error::CaptureError;
use crate::model::ScreenRect;

/// A clamped pixel-space rectangle, ready to hand to the pixel source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// A captured, JPEG-encoded frame plus its clamped pixel dimensions.
#[derive(Debug, Clone)]
pub struct Frame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

const JPEG_QUALITY: u8 = 85;

/// Computes the clamped crop rectangle in the coordinate space of a
/// `source_w x source_h` pixel source, given a CSS-pixel screen rect, the
/// observer's device pixel ratio, and the ratio between the pixel source's
/// resolution and the display's reported physical resolution (normally 1.0).
pub fn compute_crop_rect(
    rect: ScreenRect,
    dpr: f64,
    source_w: u32,
    source_h: u32,
    physical_w: u32,
    physical_h: u32,
) -> Result<CaptureRect, CaptureError> {
    if source_w == 0 || source_h == 0 {
        return Err(CaptureError::NoSource);
    }
    let thumb_scale_x = source_w as f64 / physical_w.max(1) as f64;
    let thumb_scale_y = source_h as f64 / physical_h.max(1) as f64;

    let crop_x = (rect.x * dpr * thumb_scale_x).round() as i64;
    let crop_y = (rect.y * dpr * thumb_scale_y).round() as i64;
    let crop_w = (rect.w * dpr * thumb_scale_x).round() as i64;
    let crop_h = (rect.h * dpr * thumb_scale_y).round() as i64;

    let left = crop_x.clamp(0, source_w as i64);
    let top = crop_y.clamp(0, source_h as i64);
    let right = (crop_x + crop_w).clamp(0, source_w as i64);
    let bottom = (crop_y + crop_h).clamp(0, source_h as i64);

    let w = right - left;
    let h = bottom - top;
    if w <= 0 || h <= 0 {
        return Err(CaptureError::InvalidGeometry);
    }

    Ok(CaptureRect {
        x: left as i32,
        y: top as i32,
        w: w as i32,
        h: h as i32,
    })
}

/// Encodes an RGBA buffer as a JPEG at the module's fixed quality.
pub fn encode_jpeg(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let img = image::RgbaImage::from_raw(width, height, rgba.to_vec())
        .ok_or(CaptureError::InvalidGeometry)?;
    let rgb = image::DynamicImage::ImageRgba8(img).to_rgb8();

    let mut out = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder.encode(
        rgb.as_raw(),
        width,
        height,
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

/// Captures the given screen rectangle and returns a JPEG-encoded frame.
/// Platform pixel acquisition lives in `capture::platform`; this function
/// composes it with the crop arithmetic above and the JPEG encode step.
pub fn capture(rect: ScreenRect, dpr: f64) -> Result<Frame, CaptureError> {
    let source = platform::grab_screen()?;
    let crop = compute_crop_rect(
        rect,
        dpr,
        source.width,
        source.height,
        source.physical_width,
        source.physical_height,
    )?;
    let cropped = platform::crop(&source, crop)?;
    let jpeg = encode_jpeg(&cropped.rgba, cropped.width, cropped.height)?;
    Ok(Frame {
        jpeg,
        width: cropped.width,
        height: cropped.height,
    })
}

/// A full-screen pixel grab plus the display metrics used to interpret it.
pub struct ScreenSource {
    pub width: u32,
    pub height: u32,
    pub physical_width: u32,
    pub physical_height: u32,
}

pub struct CroppedImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[cfg(windows)]
mod platform {
    use super::{CaptureRect, CroppedImage, ScreenSource};
    use crate::error::CaptureError;
    use windows::Win32::Foundation::RECT;
    use windows::Win32::Graphics::Gdi::{
        BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC,
        GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS,
        SRCCOPY,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetSystemMetrics, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN, SM_XVIRTUALSCREEN,
        SM_YVIRTUALSCREEN,
    };

    /// Holds the whole-virtual-screen bitmap for the duration of one
    /// capture, so the crop step can BitBlt directly from it without a
    /// second full-screen read.
    pub struct RawCapture {
        hdc_mem: windows::Win32::Graphics::Gdi::HDC,
        hbitmap: windows::Win32::Graphics::Gdi::HBITMAP,
        origin_x: i32,
        origin_y: i32,
    }

    impl Drop for RawCapture {
        fn drop(&mut self) {
            unsafe {
                let _ = DeleteObject(self.hbitmap.into());
                let _ = DeleteDC(self.hdc_mem);
            }
        }
    }

    pub fn grab_screen() -> Result<ScreenSource, CaptureError> {
        unsafe {
            let origin_x = GetSystemMetrics(SM_XVIRTUALSCREEN);
            let origin_y = GetSystemMetrics(SM_YVIRTUALSCREEN);
            let w = GetSystemMetrics(SM_CXVIRTUALSCREEN);
            let h = GetSystemMetrics(SM_CYVIRTUALSCREEN);
            if w <= 0 || h <= 0 {
                return Err(CaptureError::NoSource);
            }

            let hdc_screen = GetDC(None);
            if hdc_screen.is_invalid() {
                return Err(CaptureError::NoSource);
            }
            let hdc_mem = CreateCompatibleDC(Some(hdc_screen));
            let hbitmap = CreateCompatibleBitmap(hdc_screen, w, h);
            let old = SelectObject(hdc_mem, hbitmap.into());
            let ok = BitBlt(hdc_mem, 0, 0, w, h, Some(hdc_screen), origin_x, origin_y, SRCCOPY);
            SelectObject(hdc_mem, old);
            ReleaseDC(None, hdc_screen);

            if ok.is_err() {
                let _ = DeleteObject(hbitmap.into());
                let _ = DeleteDC(hdc_mem);
                return Err(CaptureError::EmptyCapture);
            }

            // Stash the raw handles in a thread-local so `crop` can reuse
            // them without re-grabbing the whole screen.
            CURRENT.with(|cell| {
                *cell.borrow_mut() = Some(RawCapture {
                    hdc_mem,
                    hbitmap,
                    origin_x,
                    origin_y,
                });
            });

            Ok(ScreenSource {
                width: w as u32,
                height: h as u32,
                physical_width: w as u32,
                physical_height: h as u32,
            })
        }
    }

    thread_local! {
        static CURRENT: std::cell::RefCell<Option<RawCapture>> = std::cell::RefCell::new(None);
    }

    pub fn crop(_source: &ScreenSource, rect: CaptureRect) -> Result<CroppedImage, CaptureError> {
        CURRENT.with(|cell| {
            let guard = cell.borrow();
            let raw = guard.as_ref().ok_or(CaptureError::NoSource)?;
            unsafe { crop_from_raw(raw, rect) }
        })
    }

    unsafe fn crop_from_raw(raw: &RawCapture, rect: CaptureRect) -> Result<CroppedImage, CaptureError> {
        let w = rect.w;
        let h = rect.h;

        let mut bmi = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: w,
                biHeight: -h,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0 as u32,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut buffer: Vec<u8> = vec![0; (w * h * 4) as usize];

        let hdc_screen = GetDC(None);
        let hdc_temp = CreateCompatibleDC(Some(hdc_screen));
        let hbm_temp = CreateCompatibleBitmap(hdc_screen, w, h);
        let old = SelectObject(hdc_temp, hbm_temp.into());

        let blit_ok = BitBlt(hdc_temp, 0, 0, w, h, Some(raw.hdc_mem), rect.x, rect.y, SRCCOPY);

        let read = if blit_ok.is_ok() {
            GetDIBits(
                hdc_temp,
                hbm_temp,
                0,
                h as u32,
                Some(buffer.as_mut_ptr() as *mut _),
                &mut bmi,
                DIB_RGB_COLORS,
            )
        } else {
            0
        };

        SelectObject(hdc_temp, old);
        let _ = DeleteObject(hbm_temp.into());
        let _ = DeleteDC(hdc_temp);
        ReleaseDC(None, hdc_screen);
        let _ = raw.origin_x;
        let _ = raw.origin_y;
        let _ = RECT::default();

        if !blit_ok.is_ok() || read == 0 {
            return Err(CaptureError::EmptyCapture);
        }

        for chunk in buffer.chunks_exact_mut(4) {
            chunk.swap(0, 2);
            chunk[3] = 255;
        }

        Ok(CroppedImage {
            rgba: buffer,
            width: w as u32,
            height: h as u32,
        })
    }
}

#[cfg(not(windows))]
mod platform {
    use super::{CaptureRect, CroppedImage, ScreenSource};
    use crate::error::CaptureError;

    /// No screen source is wired up on non-Windows targets; the capture
    /// backend here is Win32 GDI only.
    pub fn grab_screen() -> Result<ScreenSource, CaptureError> {
        Err(CaptureError::NoSource)
    }

    pub fn crop(_source: &ScreenSource, _rect: CaptureRect) -> Result<CroppedImage, CaptureError> {
        Err(CaptureError::NoSource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> ScreenRect {
        ScreenRect { x, y, w, h }
    }

    #[test]
    fn clamps_fully_visible_rect() {
        let crop = compute_crop_rect(rect(100.0, 100.0, 400.0, 800.0), 2.0, 3840, 2160, 3840, 2160)
            .unwrap();
        assert_eq!(crop, CaptureRect { x: 200, y: 200, w: 800, h: 1600 });
    }

    #[test]
    fn partially_offscreen_rect_clamps_to_positive_area() {
        let crop = compute_crop_rect(rect(-50.0, 0.0, 200.0, 200.0), 1.0, 1920, 1080, 1920, 1080)
            .unwrap();
        assert_eq!(crop.x, 0);
        assert!(crop.w > 0);
    }

    #[test]
    fn fully_offscreen_rect_is_rejected() {
        let err = compute_crop_rect(rect(-500.0, 0.0, 100.0, 100.0), 1.0, 1920, 1080, 1920, 1080)
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidGeometry));
    }

    #[test]
    fn zero_area_rect_is_rejected() {
        let err = compute_crop_rect(rect(10.0, 10.0, 0.0, 50.0), 1.0, 1920, 1080, 1920, 1080)
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidGeometry));
    }

    #[test]
    fn thumb_scale_applies_when_source_differs_from_physical() {
        // Source half the resolution of the reported physical display.
        let crop = compute_crop_rect(rect(100.0, 100.0, 200.0, 200.0), 1.0, 960, 540, 1920, 1080)
            .unwrap();
        assert_eq!(crop, CaptureRect { x: 50, y: 50, w: 100, h: 100 });
    }
}
