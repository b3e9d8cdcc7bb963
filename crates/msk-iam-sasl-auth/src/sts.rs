//! STS `AssumeRole` client (SigV4 §4.D).
//!
//! Builds and sends one signed `POST` request per call, then parses the XML
//! response into a [`StsCredentials`]. Only active when STS mode is enabled.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::canonical::{canonical_headers, canonical_request, credential_scope, string_to_sign, CanonicalHeader, SigningClock};
use crate::error::{AuthError, Result};
use crate::hash::uri_encode;
use crate::signer::{authorization_header, sign};

const SERVICE: &str = "sts";
const STS_HOST: &str = "sts.amazonaws.com";
const STS_ENDPOINT: &str = "https://sts.amazonaws.com/";

/// The parameters an `AssumeRole` call needs; a borrowed view over the
/// validated configuration.
pub struct AssumeRoleInput<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub region: &'a str,
    pub role_arn: &'a str,
    pub role_session_name: &'a str,
    pub external_id: Option<&'a str>,
    pub duration_sec: u32,
}

/// Credentials extracted from a successful `AssumeRoleResponse`.
#[derive(Debug, Clone)]
pub struct StsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at_unix_ms: i64,
}

/// Serializes XML parsing across concurrent callers: quick_xml's pull
/// parser is cheap to construct but this mutex exists to mirror the
/// assumption in the design that the surrounding parser infrastructure is
/// not reentrant.
static XML_PARSE_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn build_body(input: &AssumeRoleInput<'_>) -> String {
    let mut body = format!(
        "Action=AssumeRole&DurationSeconds={}&RoleArn={}&RoleSessionName={}",
        input.duration_sec,
        uri_encode(input.role_arn),
        input.role_session_name,
    );
    if let Some(external_id) = input.external_id {
        body.push_str(&format!("&ExternalId={}", uri_encode(external_id)));
    }
    body.push_str("&Version=2011-06-15");
    body
}

fn build_request(input: &AssumeRoleInput<'_>, clock: &SigningClock) -> (String, Vec<(String, String)>) {
    let body = build_body(input);

    let (headers_block, signed_headers) = canonical_headers(&[
        CanonicalHeader { name: "content-length", value: &body.len().to_string() },
        CanonicalHeader { name: "content-type", value: "application/x-www-form-urlencoded; charset=utf-8" },
        CanonicalHeader { name: "host", value: STS_HOST },
        CanonicalHeader { name: "x-amz-date", value: &clock.amz_date },
    ]);
    let request = canonical_request("POST", "", &headers_block, &signed_headers, body.as_bytes());
    let scope = credential_scope(&clock.ymd, input.region, SERVICE);
    let sts = string_to_sign(&clock.amz_date, &scope, &request);
    let signature = sign(input.secret_access_key, &clock.ymd, input.region, SERVICE, &sts);
    let authorization = authorization_header(input.access_key_id, &scope, &signed_headers, &signature);

    let headers = vec![
        ("Host".to_string(), STS_HOST.to_string()),
        ("User-Agent".to_string(), "librdkafka".to_string()),
        ("Content-Length".to_string(), body.len().to_string()),
        (
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded; charset=utf-8".to_string(),
        ),
        ("Authorization".to_string(), authorization),
        ("X-Amz-Date".to_string(), clock.amz_date.clone()),
        ("Accept-Encoding".to_string(), "gzip".to_string()),
    ];
    (body, headers)
}

/// Call STS `AssumeRole` and return parsed credentials, or a protocol/transport error.
pub async fn assume_role(client: &reqwest::Client, input: &AssumeRoleInput<'_>) -> Result<StsCredentials> {
    assume_role_at(client, input, STS_ENDPOINT).await
}

/// Like [`assume_role`] but against an arbitrary endpoint; the production
/// path always uses `STS_ENDPOINT`, tests point this at a `wiremock` server.
pub async fn assume_role_at(client: &reqwest::Client, input: &AssumeRoleInput<'_>, endpoint: &str) -> Result<StsCredentials> {
    let clock = SigningClock::now();
    let (body, headers) = build_request(input, &clock);

    tracing::info!(role_arn = %input.role_arn, region = %input.region, "requesting STS credentials");

    let mut request = client.post(endpoint).body(body);
    for (name, value) in &headers {
        request = request.header(name.as_str(), value.as_str());
    }
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        tracing::warn!(status = %status, "STS returned non-success status");
    }

    parse_assume_role_response(&text)
}

fn parse_assume_role_response(xml: &str) -> Result<StsCredentials> {
    let _guard = XML_PARSE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                let tag_name = std::str::from_utf8(name.as_ref()).map_err(|e| AuthError::StsProtocol(e.to_string()))?;
                return match tag_name {
                    "ErrorResponse" => Err(parse_error_response(&mut reader)?),
                    "AssumeRoleResponse" => parse_assume_role_result(&mut reader),
                    other => Err(AuthError::StsProtocol(format!("unexpected root element '{other}'"))),
                };
            }
            Event::Eof => {
                return Err(AuthError::StsProtocol("empty or malformed XML response".to_string()));
            }
            _ => {}
        }
    }
}

fn parse_error_response(reader: &mut Reader<&[u8]>) -> Result<AuthError> {
    let mut message = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"Error" => {
                message = Some(parse_error_message(reader)?);
            }
            Event::Start(_) => skip_element(reader)?,
            Event::End(e) if e.name().as_ref() == b"ErrorResponse" => break,
            Event::Eof => return Err(AuthError::StsProtocol("unexpected EOF in ErrorResponse".to_string())),
            _ => {}
        }
    }
    match message {
        Some(msg) => Ok(AuthError::StsProtocol(msg)),
        None => Ok(AuthError::StsProtocol("STS ErrorResponse missing Error/Message".to_string())),
    }
}

fn parse_error_message(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut message = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"Message" => {
                message = Some(read_text_content(reader)?);
            }
            Event::Start(_) => skip_element(reader)?,
            Event::End(e) if e.name().as_ref() == b"Error" => break,
            Event::Eof => return Err(AuthError::StsProtocol("unexpected EOF in Error".to_string())),
            _ => {}
        }
    }
    message.ok_or_else(|| AuthError::StsProtocol("STS Error missing Message".to_string()))
}

fn parse_assume_role_result(reader: &mut Reader<&[u8]>) -> Result<StsCredentials> {
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"AssumeRoleResult" => {
                return parse_credentials_container(reader);
            }
            Event::Start(_) => skip_element(reader)?,
            Event::End(e) if e.name().as_ref() == b"AssumeRoleResponse" => {
                return Err(AuthError::StsProtocol("AssumeRoleResponse missing AssumeRoleResult".to_string()));
            }
            Event::Eof => return Err(AuthError::StsProtocol("unexpected EOF in AssumeRoleResponse".to_string())),
            _ => {}
        }
    }
}

fn parse_credentials_container(reader: &mut Reader<&[u8]>) -> Result<StsCredentials> {
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"Credentials" => {
                return parse_credentials(reader);
            }
            Event::Start(_) => skip_element(reader)?,
            Event::End(e) if e.name().as_ref() == b"AssumeRoleResult" => {
                return Err(AuthError::StsProtocol("AssumeRoleResult missing Credentials".to_string()));
            }
            Event::Eof => return Err(AuthError::StsProtocol("unexpected EOF in AssumeRoleResult".to_string())),
            _ => {}
        }
    }
}

fn parse_credentials(reader: &mut Reader<&[u8]>) -> Result<StsCredentials> {
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;
    let mut expiration = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                let tag_name = std::str::from_utf8(name.as_ref()).map_err(|e| AuthError::StsProtocol(e.to_string()))?;
                match tag_name {
                    "AccessKeyId" => access_key_id = Some(read_text_content(reader)?),
                    "SecretAccessKey" => secret_access_key = Some(read_text_content(reader)?),
                    "SessionToken" => session_token = Some(read_text_content(reader)?),
                    "Expiration" => expiration = Some(read_text_content(reader)?),
                    _ => skip_element(reader)?,
                }
            }
            Event::End(e) if e.name().as_ref() == b"Credentials" => break,
            Event::Eof => return Err(AuthError::StsProtocol("unexpected EOF in Credentials".to_string())),
            _ => {}
        }
    }

    let access_key_id = access_key_id.ok_or_else(|| AuthError::StsProtocol("Credentials missing AccessKeyId".to_string()))?;
    let secret_access_key =
        secret_access_key.ok_or_else(|| AuthError::StsProtocol("Credentials missing SecretAccessKey".to_string()))?;
    let session_token = session_token.ok_or_else(|| AuthError::StsProtocol("Credentials missing SessionToken".to_string()))?;
    let expiration = expiration.ok_or_else(|| AuthError::StsProtocol("Credentials missing Expiration".to_string()))?;
    let expires_at_unix_ms = parse_iso8601_to_unix_ms(&expiration)?;

    Ok(StsCredentials { access_key_id, secret_access_key, session_token, expires_at_unix_ms })
}

fn read_text_content(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e.decode().map_err(|err| AuthError::StsProtocol(err.to_string()))?;
                text.push_str(&decoded);
            }
            Event::End(_) => return Ok(text),
            Event::Eof => return Err(AuthError::StsProtocol("unexpected EOF reading text content".to_string())),
            _ => {}
        }
    }
}

fn skip_element(reader: &mut Reader<&[u8]>) -> Result<()> {
    let mut depth: u32 = 1;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => return Err(AuthError::StsProtocol("unexpected EOF while skipping element".to_string())),
            _ => {}
        }
    }
}

/// Parse `YYYY-MM-DDTHH:MM:SS[.fff]Z` (UTC only) into a Unix-millisecond timestamp,
/// using the same pure-integer calendar arithmetic as [`SigningClock`].
fn parse_iso8601_to_unix_ms(s: &str) -> Result<i64> {
    let err = || AuthError::StsProtocol(format!("invalid Expiration timestamp '{s}'"));

    let s = s.strip_suffix('Z').ok_or_else(err)?;
    let (date_part, time_part) = s.split_once('T').ok_or_else(err)?;

    let mut date_fields = date_part.splitn(3, '-');
    let year: i64 = date_fields.next().ok_or_else(err)?.parse().map_err(|_| err())?;
    let month: i64 = date_fields.next().ok_or_else(err)?.parse().map_err(|_| err())?;
    let day: i64 = date_fields.next().ok_or_else(err)?.parse().map_err(|_| err())?;

    let (time_main, millis) = match time_part.split_once('.') {
        Some((main, frac)) => {
            let millis_str: String = frac.chars().chain(std::iter::repeat('0')).take(3).collect();
            (main, millis_str.parse::<i64>().map_err(|_| err())?)
        }
        None => (time_part, 0),
    };
    let mut time_fields = time_main.splitn(3, ':');
    let hour: i64 = time_fields.next().ok_or_else(err)?.parse().map_err(|_| err())?;
    let minute: i64 = time_fields.next().ok_or_else(err)?.parse().map_err(|_| err())?;
    let second: i64 = time_fields.next().ok_or_else(err)?.parse().map_err(|_| err())?;

    // Howard Hinnant's days_from_civil, inverse of SigningClock::from_unix_secs.
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    let days = era * 146_097 + doe - 719_468;

    let unix_secs = days * 86_400 + hour * 3_600 + minute * 60 + second;
    Ok(unix_secs * 1000 + millis)
}
