//! Canonical request construction (SigV4 §4.B).
//!
//! Every function here is a pure transform over strings/bytes — no I/O, no
//! clock reads except inside [`SigningClock`], which exists precisely so a
//! single signing operation derives `ymd`/`hms`/`amz_date` from one sampled
//! instant (see the Open Questions note on clock-crossing drift).

use std::time::{SystemTime, UNIX_EPOCH};

use crate::hash::sha256_hex;

/// The one AWS signing algorithm this crate implements.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// A single sampled instant, broken into the three string forms SigV4 needs.
///
/// Constructed once per signing operation; every derived string traces back
/// to the same `unix_secs` value.
pub struct SigningClock {
    pub ymd: String,
    pub hms: String,
    pub amz_date: String,
}

impl SigningClock {
    /// Sample the current time exactly once and derive all three forms from it.
    pub fn now() -> Self {
        let unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::from_unix_secs(unix_secs)
    }

    /// Derive the three string forms from an explicit Unix timestamp.
    ///
    /// Uses integer arithmetic only (Howard Hinnant's `civil_from_days`
    /// algorithm) — no timezone database, no leap-second table.
    pub fn from_unix_secs(unix_secs: u64) -> Self {
        let secs_of_day = unix_secs % 86_400;
        let hour = secs_of_day / 3_600;
        let minute = (secs_of_day % 3_600) / 60;
        let second = secs_of_day % 60;

        let days = unix_secs / 86_400;
        let z = days as i64 + 719_468;
        let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
        let doe = (z - era * 146_097) as u64;
        let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
        let y = yoe as i64 + era * 400;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let d = doy - (153 * mp + 2) / 5 + 1;
        let m = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = if m <= 2 { y + 1 } else { y };

        let ymd = format!("{:04}{:02}{:02}", year, m, d);
        let hms = format!("{:02}{:02}{:02}", hour, minute, second);
        let amz_date = format!("{ymd}T{hms}Z");
        Self { ymd, hms, amz_date }
    }
}

/// `"{ymd}/{region}/{service}/aws4_request"`.
pub fn credential_scope(ymd: &str, region: &str, service: &str) -> String {
    format!("{ymd}/{region}/{service}/aws4_request")
}

/// A (name, value) pair destined for the canonical headers block. Names must
/// already be lowercase; callers are responsible for supplying them in the
/// exact order that matches `signed_headers`.
pub struct CanonicalHeader<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

/// Build the newline-terminated canonical headers block and the matching
/// `;`-joined `signed_headers` string, in the order the caller provided.
pub fn canonical_headers(headers: &[CanonicalHeader<'_>]) -> (String, String) {
    let mut block = String::new();
    let mut names = Vec::with_capacity(headers.len());
    for h in headers {
        block.push_str(h.name);
        block.push(':');
        block.push_str(h.value.trim());
        block.push('\n');
        names.push(h.name);
    }
    (block, names.join(";"))
}

/// Build the canonical request. The canonical URI is always `"/"` for both
/// use sites in this crate (STS `AssumeRole` and the SASL `kafka-cluster:Connect`
/// signature), so it is not a parameter.
pub fn canonical_request(
    method: &str,
    canonical_query_string: &str,
    canonical_headers_block: &str,
    signed_headers: &str,
    body: &[u8],
) -> String {
    format!(
        "{}\n/\n{}\n{}\n{}\n{}",
        method.to_uppercase(),
        canonical_query_string,
        canonical_headers_block,
        signed_headers,
        sha256_hex(body),
    )
}

/// `algorithm + "\n" + amz_date + "\n" + credential_scope + "\n" + hex(sha256(canonical_request))`.
pub fn string_to_sign(amz_date: &str, credential_scope: &str, canonical_request: &str) -> String {
    format!(
        "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_clock_known_instant() {
        let clock = SigningClock::from_unix_secs(1_369_353_600); // 2013-05-24T00:00:00Z
        assert_eq!(clock.ymd, "20130524");
        assert_eq!(clock.hms, "000000");
        assert_eq!(clock.amz_date, "20130524T000000Z");
    }

    #[test]
    fn test_signing_clock_epoch() {
        let clock = SigningClock::from_unix_secs(0);
        assert_eq!(clock.ymd, "19700101");
        assert_eq!(clock.amz_date, "19700101T000000Z");
    }

    #[test]
    fn test_signing_clock_leap_day() {
        let clock = SigningClock::from_unix_secs(1_709_164_800); // 2024-02-29T00:00:00Z
        assert_eq!(clock.ymd, "20240229");
    }

    #[test]
    fn test_credential_scope() {
        assert_eq!(
            credential_scope("20210910", "us-east-1", "sts"),
            "20210910/us-east-1/sts/aws4_request"
        );
    }

    #[test]
    fn test_canonical_headers_order_preserved() {
        let headers = [
            CanonicalHeader { name: "content-length", value: "42" },
            CanonicalHeader { name: "host", value: " sts.amazonaws.com " },
        ];
        let (block, signed) = canonical_headers(&headers);
        assert_eq!(block, "content-length:42\nhost:sts.amazonaws.com\n");
        assert_eq!(signed, "content-length;host");
    }

    #[test]
    fn test_canonical_request_sasl_scenario() {
        // Worked example: SASL kafka-cluster:Connect canonical request.
        let query = "Action=kafka-cluster%3AConnect&X-Amz-Algorithm=AWS4-HMAC-SHA256\
&X-Amz-Credential=AWS_ACCESS_KEY_ID%2F20100101%2Fus-east-1%2Fkafka-cluster%2Faws4_request\
&X-Amz-Date=20100101T000000Z&X-Amz-Expires=900&X-Amz-SignedHeaders=host";
        let (block, signed) = canonical_headers(&[CanonicalHeader {
            name: "host",
            value: "hostname",
        }]);
        let request = canonical_request("GET", query, &block, &signed, b"");
        let expected = "GET\n/\nAction=kafka-cluster%3AConnect&X-Amz-Algorithm=AWS4-HMAC-SHA256\
&X-Amz-Credential=AWS_ACCESS_KEY_ID%2F20100101%2Fus-east-1%2Fkafka-cluster%2Faws4_request\
&X-Amz-Date=20100101T000000Z&X-Amz-Expires=900&X-Amz-SignedHeaders=host\n\
host:hostname\n\n\
host\n\
e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(request, expected);
    }
}
