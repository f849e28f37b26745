use base64::{
    engine::general_purpose::STANDARD,
    Engine,
};
use futures::future::join_all;
use tracing::info;

use crate::{
    core::{
        CardContent,
        ForgeError,
    },
    generator::PairGenerator,
};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const ACCEPTED_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// An upload that passed validation, ready to hand to the generator.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub filename: String,
    pub base64: String,
}

/// Checks content type and size, then base64-encodes the image bytes.
/// Rejection here is a request-level error, not a business outcome.
pub fn prepare_image(
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<EncodedImage, ForgeError> {
    match content_type {
        Some(ct) if ACCEPTED_TYPES.contains(&ct) => {}
        _ => {
            return Err(ForgeError::InvalidImage(format!("Invalid image type: {}", filename)));
        }
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ForgeError::InvalidImage(format!("File too large: {}", filename)));
    }
    Ok(EncodedImage { filename: filename.to_string(), base64: STANDARD.encode(bytes) })
}

/// Extracts pairs from several images concurrently. Inputs are independent,
/// so the calls fan out; results come back in input order.
pub async fn extract_from_images<G: PairGenerator>(
    generator: &G,
    images: &[EncodedImage],
) -> Vec<Vec<CardContent>> {
    let futures = images
        .iter()
        .map(|image| async move { generator.pairs_from_image(&image.base64, &image.filename).await });
    let results = join_all(futures).await;

    for (image, pairs) in images.iter().zip(&results) {
        info!("extracted {} pairs from {}", pairs.len(), image.filename);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_content_types() {
        let err = prepare_image("doc.pdf", Some("application/pdf"), b"x").unwrap_err();
        assert!(matches!(err, ForgeError::InvalidImage(_)));
        assert!(prepare_image("no_type.png", None, b"x").is_err());
    }

    #[test]
    fn rejects_oversized_images() {
        let bytes = vec![0u8; MAX_IMAGE_BYTES + 1];
        let err = prepare_image("big.png", Some("image/png"), &bytes).unwrap_err();
        assert!(matches!(err, ForgeError::InvalidImage(_)));
    }

    #[test]
    fn encodes_accepted_images() {
        let image = prepare_image("ok.png", Some("image/png"), b"abc").unwrap();
        assert_eq!(image.base64, "YWJj");
        assert_eq!(image.filename, "ok.png");
    }
}
