//! Serde helpers for byte fields carried as base64 strings in JSON.

/// `Option<Vec<u8>>` as an optional standard-alphabet base64 string.
pub mod base64_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(default, with = "super::base64_opt")]
        token: Option<Vec<u8>>,
    }

    #[test]
    fn test_null_and_missing_decode_to_none() {
        let h: Holder = serde_json::from_str(r#"{"token": null}"#).unwrap();
        assert_eq!(h.token, None);
        let h: Holder = serde_json::from_str("{}").unwrap();
        assert_eq!(h.token, None);
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let res = serde_json::from_str::<Holder>(r#"{"token": "not base64!"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_encodes_standard_alphabet() {
        let h = Holder {
            token: Some(vec![0xfb, 0xff]),
        };
        assert_eq!(serde_json::to_string(&h).unwrap(), r#"{"token":"+/8="}"#);
    }
}
