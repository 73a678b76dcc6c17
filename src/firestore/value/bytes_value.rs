use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

/// Encodes with padding and accepts padded or unpadded input, since JS runtimes
/// disagree on whether blobs travel padded.
const BLOB_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BytesValue(Vec<u8>);

impl BytesValue {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_base64(value: &str) -> Result<Self, base64::DecodeError> {
        BLOB_ENGINE.decode(value).map(Self)
    }

    pub fn to_base64(&self) -> String {
        BLOB_ENGINE.encode(&self.0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for BytesValue {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_padding() {
        assert_eq!(BytesValue::new(vec![1, 2]).to_base64(), "AQI=");
    }

    #[test]
    fn decodes_padded_and_unpadded() {
        assert_eq!(BytesValue::from_base64("AQI=").unwrap().as_slice(), &[1, 2]);
        assert_eq!(BytesValue::from_base64("AQI").unwrap().as_slice(), &[1, 2]);
        assert!(BytesValue::from_base64("not base64!").is_err());
    }
}
