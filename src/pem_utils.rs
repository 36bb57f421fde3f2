use crate::error::CaError;

/// PEM label of a certificate revocation list.
pub const CRL_LABEL: &str = "X509 CRL";

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(
        &pem,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Convert a PEM‑encoded string to DER‑encoded bytes, checking the label.
pub fn pem_to_der(pem_str: &str, label: &str) -> Result<Vec<u8>, CaError> {
    let pem = pem::parse(pem_str).map_err(|e| CaError::DecodingError(e.to_string()))?;
    if pem.tag() != label {
        return Err(CaError::DecodingError(format!(
            "expected PEM label {label:?}, found {:?}",
            pem.tag()
        )));
    }
    Ok(pem.contents().to_vec())
}
