//! Human-readable summaries of verification inputs.

use manifest_sig_sigstore::BlobRequest;

/// One-line summary of the encoded inputs a blob request carries,
/// e.g. `message 1.5 KiB, signature 96 B, bundle 4.2 KiB`.
pub fn describe_inputs(request: &BlobRequest) -> String {
    let optional = [
        ("certificate", request.certificate.as_deref()),
        ("bundle", request.bundle.as_deref()),
    ];

    let mut parts = vec![
        format!("message {}", encoded_size(request.message.len())),
        format!("signature {}", encoded_size(request.signature.len())),
    ];
    parts.extend(
        optional
            .iter()
            .filter_map(|(name, data)| data.map(|d| format!("{name} {}", encoded_size(d.len())))),
    );
    parts.join(", ")
}

/// Encoded inputs are small; anything past a mebibyte is still shown in KiB
/// so sizes of the same request stay comparable.
fn encoded_size(len: usize) -> String {
    if len < 1024 {
        format!("{len} B")
    } else {
        format!("{:.1} KiB", len as f64 / 1024.0)
    }
}
