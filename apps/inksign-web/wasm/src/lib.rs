//! WASM bindings for the InkSign overlay editor
//!
//! All editor state lives in Rust behind `AnnotatorSession`. JavaScript
//! renders pages with pdf.js, mounts one image and one overlay canvas per
//! page, and listens for actions.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { AnnotatorSession } from './pkg/inksign_wasm.js';
//!
//! await init();
//!
//! const session = new AnnotatorSession(pdf.numPages);
//! session.setActionCallback((actions) => updateToolbar(actions));
//! await session.loadPages((page, scale) => renderWithPdfJs(page, scale));
//! for (const page of session.pageOrder()) {
//!   session.attachPage(page, imageFor(page), canvasFor(page));
//! }
//!
//! session.placeSignature(padDataUrl, 200, 80);
//! // the next click on a page places it
//!
//! const { bytes, skipped } = session.exportPdf("skip_failed");
//! downloadBlob(bytes, "signed.pdf");
//! ```

pub mod canvas;
pub mod session;
pub mod viewport;

use wasm_bindgen::prelude::*;

pub use session::AnnotatorSession;

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    web_sys::console::log_1(&format!("InkSign {} loaded", get_version()).into());
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_version() {
        let version = get_version();
        assert!(!version.is_empty());
    }
}
