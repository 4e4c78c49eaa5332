//! Message body decoding: MIME-tree walk, HTML stripping, URL mining.

pub mod body;
pub mod html;
pub mod urls;

pub use body::{decode_body, extract_pdf_text, DecodedBody};
pub use html::html_to_text;
pub use urls::{mine_image_urls, mine_product_urls, pick_best_url};
