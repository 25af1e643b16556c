//! Login token rendering.
//!
//! Converts the raw pairing token issued by the chat network into a QR code
//! served as a `data:` URL, so callers can drop it straight into an `<img>`.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use qrcode::render::svg;
use qrcode::QrCode;
use serde::Serialize;

/// Minimum rendered edge length, in pixels.
const MIN_DIMENSION: u32 = 256;

/// A renderable login image (`data:image/svg+xml;base64,...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LoginImage(String);

impl LoginImage {
    /// MIME type of the embedded image.
    pub const MIME: &'static str = "image/svg+xml";

    /// Get the data URL.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the data URL string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for LoginImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render a raw login token as a scannable QR image.
///
/// Returns `None` for empty tokens and for tokens the QR encoder rejects
/// (e.g. data too long); the caller treats that as "no token available yet".
pub fn render_login_token(raw: &str) -> Option<LoginImage> {
    if raw.is_empty() {
        return None;
    }

    let code = match QrCode::new(raw.as_bytes()) {
        Ok(code) => code,
        Err(e) => {
            tracing::warn!(len = raw.len(), "failed to encode login token: {}", e);
            return None;
        }
    };

    let image = code
        .render::<svg::Color>()
        .min_dimensions(MIN_DIMENSION, MIN_DIMENSION)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();

    Some(LoginImage(format!(
        "data:{};base64,{}",
        LoginImage::MIME,
        STANDARD.encode(image.as_bytes())
    )))
}
