//! QR rendering for pairing payloads.

use base64::{engine::general_purpose::STANDARD, Engine};
use okibot_core::error::OkibotError;
use qrcode::{Color, EcLevel, QrCode};

fn encode(qr_data: &str) -> Result<QrCode, OkibotError> {
    QrCode::with_error_correction_level(qr_data.as_bytes(), EcLevel::L)
        .map_err(|e| OkibotError::Transport(format!("QR generation failed: {e}")))
}

/// Render a compact QR for the terminal using Unicode half-blocks.
///
/// Two module rows share one text line, so the output is about half the height of
/// a naive renderer.
pub fn generate_qr_terminal(qr_data: &str) -> Result<String, OkibotError> {
    let code = encode(qr_data)?;
    let width = code.width();
    let colors: Vec<Color> = code.into_colors();
    let is_dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    let mut out = String::with_capacity((width + 1) * width.div_ceil(2) * 3);
    for row in (0..width).step_by(2) {
        for col in 0..width {
            out.push(match (is_dark(row, col), is_dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }
    Ok(out)
}

/// Render a QR as PNG bytes.
pub fn generate_qr_image(qr_data: &str) -> Result<Vec<u8>, OkibotError> {
    use image::{ImageBuffer, Luma};

    let code = encode(qr_data)?;
    let module_size: u32 = 10;
    let quiet_zone: u32 = 2;
    let modules = code.width() as u32;
    let img_size = (modules + quiet_zone * 2) * module_size;

    let img = ImageBuffer::from_fn(img_size, img_size, |x, y| {
        let (cx, cy) = (x / module_size, y / module_size);
        if cx < quiet_zone || cy < quiet_zone {
            return Luma([255u8]);
        }
        let (mx, my) = (cx - quiet_zone, cy - quiet_zone);
        if mx >= modules || my >= modules {
            return Luma([255u8]);
        }
        match code[(mx as usize, my as usize)] {
            Color::Dark => Luma([0u8]),
            Color::Light => Luma([255u8]),
        }
    });

    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| OkibotError::Transport(format!("PNG encoding failed: {e}")))?;
    Ok(buf.into_inner())
}

/// Render a QR as a `data:image/png;base64,...` URL for HTML `<img>` tags.
pub fn generate_qr_data_url(qr_data: &str) -> Result<String, OkibotError> {
    let png = generate_qr_image(qr_data)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}
