//! JSON output formats.

use serde::Serialize;

#[derive(Serialize)]
pub struct VerifyJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub target: String,
    pub trust_mode: &'a str,
    pub verified: bool,
    pub signer_name: String,
    pub signed_timestamp: Option<i64>,
}

#[derive(Serialize)]
pub struct ErrorJson<'a> {
    pub status: &'a str,
    pub error: String,
    pub causes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyless_result_without_timestamp_serializes_null() {
        let payload = VerifyJson {
            status: "ok",
            command: "verify-blob",
            target: "msg.b64".into(),
            trust_mode: "public-key",
            verified: true,
            signer_name: String::new(),
            signed_timestamp: None,
        };
        let value: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["signed_timestamp"], serde_json::Value::Null);
        assert_eq!(value["signer_name"], "");
        assert_eq!(value["trust_mode"], "public-key");
    }
}
