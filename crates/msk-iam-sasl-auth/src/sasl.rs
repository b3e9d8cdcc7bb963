//! `AWS_MSK_IAM` SASL payload builder (SigV4 §4.E).
//!
//! Builds the signed JSON payload a broker running the `AWS_MSK_IAM`
//! mechanism expects as the client's first SASL message.

use crate::canonical::{
    canonical_headers, canonical_request, credential_scope, string_to_sign, CanonicalHeader,
    SigningClock,
};
use crate::hash::uri_encode;
use crate::signer::sign;

const SERVICE: &str = "kafka-cluster";
const PAYLOAD_VERSION: &str = "2020_10_22";
const USER_AGENT: &str = "librdkafka";
const EXPIRES_SECS: &str = "900";

/// Credentials snapshot sufficient to build one signed payload.
pub struct SaslCredentials<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub region: &'a str,
    pub session_token: Option<&'a str>,
}

/// Build the signed `kafka-cluster:Connect` JSON payload for `hostname`,
/// using the given credentials and the clock sampled for this operation.
///
/// Field order matches the broker's expectation exactly; this is hand-built
/// rather than routed through a generic JSON serializer so that order and
/// the absence of a trailing comma are structural guarantees, not incidental
/// map-iteration behavior.
pub fn build_payload(creds: &SaslCredentials<'_>, hostname: &str, clock: &SigningClock) -> String {
    let scope = credential_scope(&clock.ymd, creds.region, SERVICE);
    let credential = format!("{}/{}", creds.access_key_id, scope);

    let mut query_pairs = vec![
        "Action=kafka-cluster%3AConnect".to_string(),
        "X-Amz-Algorithm=AWS4-HMAC-SHA256".to_string(),
        format!("X-Amz-Credential={}", uri_encode(&credential)),
        format!("X-Amz-Date={}", uri_encode(&clock.amz_date)),
        format!("X-Amz-Expires={EXPIRES_SECS}"),
    ];
    if let Some(token) = creds.session_token {
        query_pairs.push(format!("X-Amz-Security-Token={}", uri_encode(token)));
    }
    query_pairs.push("X-Amz-SignedHeaders=host".to_string());
    let canonical_query_string = query_pairs.join("&");

    let (headers_block, signed_headers) =
        canonical_headers(&[CanonicalHeader { name: "host", value: hostname }]);
    let request = canonical_request("GET", &canonical_query_string, &headers_block, &signed_headers, b"");
    let scope_for_sts = credential_scope(&clock.ymd, creds.region, SERVICE);
    let sts = string_to_sign(&clock.amz_date, &scope_for_sts, &request);
    let signature = sign(creds.secret_access_key, &clock.ymd, creds.region, SERVICE, &sts);

    let mut json = String::new();
    json.push('{');
    json.push_str(&format!("\"version\":\"{PAYLOAD_VERSION}\","));
    json.push_str(&format!("\"host\":\"{}\",", hostname));
    json.push_str(&format!("\"user-agent\":\"{USER_AGENT}\","));
    json.push_str("\"action\":\"kafka-cluster:Connect\",");
    json.push_str("\"x-amz-algorithm\":\"AWS4-HMAC-SHA256\",");
    json.push_str(&format!("\"x-amz-credential\":\"{}\",", credential));
    json.push_str(&format!("\"x-amz-date\":\"{}\",", clock.amz_date));
    if let Some(token) = creds.session_token {
        json.push_str(&format!("\"x-amz-security-token\":\"{}\",", token));
    }
    json.push_str("\"x-amz-signedheaders\":\"host\",");
    json.push_str(&format!("\"x-amz-expires\":\"{EXPIRES_SECS}\","));
    json.push_str(&format!("\"x-amz-signature\":\"{signature}\""));
    json.push('}');
    json
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_payload_scenario_no_session_token() {
        let clock = SigningClock::from_unix_secs(1_262_304_000); // 2010-01-01T00:00:00Z
        assert_eq!(clock.ymd, "20100101");
        assert_eq!(clock.amz_date, "20100101T000000Z");

        let creds = SaslCredentials {
            access_key_id: "AWS_ACCESS_KEY_ID",
            secret_access_key: "AWS_SECRET_ACCESS_KEY",
            region: "us-east-1",
            session_token: None,
        };
        let payload = build_payload(&creds, "hostname", &clock);

        let expected = concat!(
            "{\"version\":\"2020_10_22\",\"host\":\"hostname\",\"user-agent\":\"librdkafka\",",
            "\"action\":\"kafka-cluster:Connect\",\"x-amz-algorithm\":\"AWS4-HMAC-SHA256\",",
            "\"x-amz-credential\":\"AWS_ACCESS_KEY_ID/20100101/us-east-1/kafka-cluster/aws4_request\",",
            "\"x-amz-date\":\"20100101T000000Z\",",
            "\"x-amz-signedheaders\":\"host\",\"x-amz-expires\":\"900\",",
            "\"x-amz-signature\":\"d3eeeddfb2c2b76162d583d7499c2364eb9a92b248218e31866659b18997ef44\"}"
        );
        assert_eq!(payload, expected);
    }

    #[test]
    fn test_build_payload_with_session_token_raw_not_encoded() {
        let clock = SigningClock::from_unix_secs(1_262_304_000);
        let creds = SaslCredentials {
            access_key_id: "AKID",
            secret_access_key: "SECRET",
            region: "us-east-1",
            session_token: Some("token/with+special=chars"),
        };
        let payload = build_payload(&creds, "broker.example.com", &clock);

        // The JSON field carries the raw token, unencoded.
        assert!(payload.contains("\"x-amz-security-token\":\"token/with+special=chars\""));
        // But the signed query string embeds the URI-encoded form.
        // (We can't see the query string directly in the payload, but we can
        // confirm the signature differs from the no-token case, proving the
        // token entered the signing input.)
        let creds_no_token = SaslCredentials { session_token: None, ..creds };
        let payload_no_token = build_payload(&creds_no_token, "broker.example.com", &clock);
        assert_ne!(payload, payload_no_token);
    }

    #[test]
    fn test_build_payload_field_order_and_no_trailing_comma() {
        let clock = SigningClock::from_unix_secs(1_262_304_000);
        let creds = SaslCredentials {
            access_key_id: "AKID",
            secret_access_key: "SECRET",
            region: "us-east-1",
            session_token: Some("tok"),
        };
        let payload = build_payload(&creds, "h", &clock);
        assert!(!payload.contains(",}"));
        assert!(payload.starts_with("{\"version\":"));
        assert!(payload.ends_with('}'));

        let version_pos = payload.find("\"version\"").unwrap();
        let token_pos = payload.find("\"x-amz-security-token\"").unwrap();
        let signed_headers_pos = payload.find("\"x-amz-signedheaders\"").unwrap();
        let signature_pos = payload.find("\"x-amz-signature\"").unwrap();
        assert!(version_pos < token_pos);
        assert!(token_pos < signed_headers_pos);
        assert!(signed_headers_pos < signature_pos);
    }
}
