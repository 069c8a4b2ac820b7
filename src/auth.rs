//! Per-camera request authentication.
//!
//! - `None`: no header.
//! - `Basic` (RFC 7617): `Authorization` sent on the first request.
//! - `Digest` (RFC 7616): the first request goes out bare, the camera answers `401` with one or
//!   more `WWW-Authenticate: Digest ...` challenges, and the request is replayed with the computed
//!   response. SHA-256 challenges are preferred over MD5 when several are offered.

use crate::error::StreamError;
use crate::registry::{AuthMethod, CameraDescriptor};
use base64::Engine;
use md5::Md5;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Hash function named by a digest challenge's `algorithm` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Md5Sess,
    Sha256,
    Sha256Sess,
}

impl DigestAlgorithm {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "MD5" => Some(Self::Md5),
            "MD5-SESS" => Some(Self::Md5Sess),
            "SHA-256" => Some(Self::Sha256),
            "SHA-256-SESS" => Some(Self::Sha256Sess),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
            Self::Sha256 => "SHA-256",
            Self::Sha256Sess => "SHA-256-sess",
        }
    }

    fn is_session(self) -> bool {
        matches!(self, Self::Md5Sess | Self::Sha256Sess)
    }

    fn strength(self) -> u8 {
        match self {
            Self::Md5 | Self::Md5Sess => 0,
            Self::Sha256 | Self::Sha256Sess => 1,
        }
    }

    fn hash(self, input: &str) -> String {
        match self {
            Self::Md5 | Self::Md5Sess => hex(&Md5::digest(input.as_bytes())),
            Self::Sha256 | Self::Sha256Sess => hex(&Sha256::digest(input.as_bytes())),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// `qop` the response will use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Qop {
    Auth,
    AuthInt,
}

/// A parsed `WWW-Authenticate: Digest` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: DigestAlgorithm,
    qop: Option<Qop>,
    pub userhash: bool,
}

impl DigestChallenge {
    /// Parse one header value. Returns `None` for other schemes, missing nonce, or an algorithm
    /// this client does not implement.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(|c: char| c.is_ascii_whitespace())?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut algorithm = DigestAlgorithm::Md5;
        let mut qop = None;
        let mut userhash = false;
        for (key, value) in auth_params(rest) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "algorithm" => algorithm = DigestAlgorithm::parse(&value)?,
                "qop" => {
                    let offered: Vec<String> =
                        value.split(',').map(|q| q.trim().to_ascii_lowercase()).collect();
                    qop = if offered.iter().any(|q| q == "auth") {
                        Some(Qop::Auth)
                    } else if offered.iter().any(|q| q == "auth-int") {
                        Some(Qop::AuthInt)
                    } else {
                        None
                    };
                }
                "userhash" => userhash = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        Some(Self {
            realm: realm.unwrap_or_default(),
            nonce: nonce?,
            opaque,
            algorithm,
            qop,
            userhash,
        })
    }

    /// Compute the `Authorization` header value for a bodiless request.
    pub fn authorization(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        cnonce: &str,
        nonce_count: u32,
    ) -> String {
        let alg = self.algorithm;
        let nc = format!("{nonce_count:08x}");

        let mut ha1 = alg.hash(&format!("{username}:{}:{password}", self.realm));
        if alg.is_session() {
            ha1 = alg.hash(&format!("{ha1}:{}:{cnonce}", self.nonce));
        }
        let ha2 = match self.qop {
            Some(Qop::AuthInt) => alg.hash(&format!("{method}:{uri}:{}", alg.hash(""))),
            _ => alg.hash(&format!("{method}:{uri}")),
        };
        let response = match self.qop {
            Some(qop) => {
                let qop = if qop == Qop::Auth { "auth" } else { "auth-int" };
                alg.hash(&format!("{ha1}:{}:{nc}:{cnonce}:{qop}:{ha2}", self.nonce))
            }
            None => alg.hash(&format!("{ha1}:{}:{ha2}", self.nonce)),
        };

        let shown_user = if self.userhash {
            alg.hash(&format!("{username}:{}", self.realm))
        } else {
            username.to_string()
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm={}, response=\"{}\"",
            quote_escape(&shown_user),
            quote_escape(&self.realm),
            quote_escape(&self.nonce),
            uri,
            alg.as_str(),
            response
        );
        if let Some(opaque) = &self.opaque {
            let _ = write!(header, ", opaque=\"{}\"", quote_escape(opaque));
        }
        if let Some(qop) = self.qop {
            let qop = if qop == Qop::Auth { "auth" } else { "auth-int" };
            let _ = write!(header, ", qop={qop}, nc={nc}, cnonce=\"{cnonce}\"");
        }
        if self.userhash {
            header.push_str(", userhash=true");
        }
        header
    }
}

fn quote_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Split `k1="v, 1", k2=v2` into pairs, honouring quoted strings and backslash escapes.
fn auth_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_ascii_whitespace() || *c == ',') {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.trim().is_empty() && chars.peek().is_none() {
            break;
        }
        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            while matches!(chars.peek(), Some(c) if c.is_ascii_whitespace()) {
                chars.next();
            }
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => value.push(c),
                    }
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value = value.trim().to_string();
            }
        }
        let key = key.trim().to_string();
        if !key.is_empty() {
            params.push((key, value));
        }
        if chars.peek().is_none() {
            break;
        }
    }
    params
}

/// Attaches a camera's credentials to outgoing requests.
#[derive(Clone)]
pub struct Authenticator {
    method: AuthMethod,
    username: String,
    password: String,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("method", &self.method)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(
        method: AuthMethod,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self { method, username: username.into(), password: password.into() }
    }

    pub fn for_camera(camera: &CameraDescriptor) -> Self {
        Self::new(camera.auth_method(), camera.username(), camera.password())
    }

    pub fn method(&self) -> AuthMethod {
        self.method
    }

    /// Header to send with the first request, if the scheme allows sending one unprompted.
    pub fn preemptive_header(&self) -> Option<String> {
        match self.method {
            AuthMethod::Basic => {
                let token = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", self.username, self.password));
                Some(format!("Basic {token}"))
            }
            AuthMethod::None | AuthMethod::Digest => None,
        }
    }

    /// Whether a `401` should be answered with a second, challenge-derived request.
    pub fn answers_challenges(&self) -> bool {
        self.method == AuthMethod::Digest
    }

    /// Build the `Authorization` header answering the strongest supported digest challenge.
    pub fn answer_challenge<'a, I>(
        &self,
        challenges: I,
        method: &str,
        uri: &str,
    ) -> Result<String, StreamError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let challenge = challenges
            .into_iter()
            .filter_map(DigestChallenge::parse)
            .max_by_key(|c| c.algorithm.strength())
            .ok_or(StreamError::Auth { status: 401 })?;
        Ok(challenge.authorization(&self.username, &self.password, method, uri, &new_cnonce(), 1))
    }
}

fn new_cnonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex(&bytes)
}
