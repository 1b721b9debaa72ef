// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! AWS Signature Version 4 for single-path POST requests.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use ring::{digest, hmac};

use super::credentials::Credentials;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "sqs";
const TERMINATOR: &str = "aws4_request";

/// Headers to attach to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub security_token: Option<String>,
    pub authorization: String,
}

/// Signs a POST to `/` on `host`.
///
/// `headers` are the other headers sent with the request that must be
/// covered by the signature, names in lowercase.
pub fn sign(
    credentials: &Credentials,
    region: &str,
    host: &str,
    headers: &[(&str, &str)],
    body: &[u8],
    time: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = time.format("%Y%m%dT%H%M%SZ").to_string();
    let date = time.format("%Y%m%d").to_string();
    let scope = format!("{date}/{region}/{SERVICE}/{TERMINATOR}");

    let (canonical, signed_names) = {
        let mut signed: BTreeMap<&str, &str> = headers.iter().copied().collect();
        signed.insert("host", host);
        signed.insert("x-amz-date", &amz_date);
        if let Some(token) = &credentials.session_token {
            signed.insert("x-amz-security-token", token);
        }
        canonical_request(&signed, body)
    };
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex_sha256(canonical.as_bytes())
    );

    let key = signing_key(&credentials.secret_access_key, &date, region);
    let signature = hex(hmac::sign(&key, string_to_sign.as_bytes()).as_ref());

    SignedHeaders {
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_names}, Signature={signature}",
            credentials.access_key_id
        ),
        security_token: credentials.session_token.clone(),
        amz_date,
    }
}

/// Returns the canonical request and the `;`-joined list of signed header names.
fn canonical_request(headers: &BTreeMap<&str, &str>, body: &[u8]) -> (String, String) {
    let mut canonical = String::from("POST\n/\n\n");
    for (name, value) in headers {
        let _ = writeln!(canonical, "{name}:{}", value.trim());
    }
    let signed_names = headers.keys().copied().collect::<Vec<_>>().join(";");
    let _ = write!(canonical, "\n{signed_names}\n{}", hex_sha256(body));
    (canonical, signed_names)
}

fn signing_key(secret: &str, date: &str, region: &str) -> hmac::Key {
    let mut key = format!("AWS4{secret}").into_bytes();
    for part in [date, region, SERVICE, TERMINATOR] {
        let tag = hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, &key), part.as_bytes());
        key = tag.as_ref().to_vec();
    }
    hmac::Key::new(hmac::HMAC_SHA256, &key)
}

fn hex_sha256(data: &[u8]) -> String {
    hex(digest::digest(&digest::SHA256, data).as_ref())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
