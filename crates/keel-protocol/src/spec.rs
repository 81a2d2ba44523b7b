use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use keel_types::{ConnId, ErrorFamily};

use crate::error::{ProtocolDefError, ProtocolError, ProtocolResult, RemoteError};
use crate::wire::{RequestToken, WireMsg};

/// Server-side logic for one request code.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, conn: ConnId, body: Vec<u8>) -> Result<Vec<u8>, RemoteError>;
}

/// Builder for a [`ProtocolDef`].
///
/// A protocol is a fixed vocabulary: a version prefix (possibly empty), a
/// success and a failure code, any number of request codes with their
/// handlers, and byte codes for the error families it can carry. All
/// structural rules are enforced once, at build time.
pub struct ProtocolSpec {
    version: Vec<u8>,
    success_code: Option<Vec<u8>>,
    failure_code: Option<Vec<u8>>,
    requests: Vec<(Vec<u8>, Arc<dyn Handler>)>,
    error_codes: Vec<(Vec<u8>, ErrorFamily)>,
}

impl ProtocolSpec {
    pub fn new(version: impl Into<Vec<u8>>) -> Self {
        Self {
            version: version.into(),
            success_code: None,
            failure_code: None,
            requests: Vec::new(),
            error_codes: Vec::new(),
        }
    }

    pub fn success(mut self, code: impl Into<Vec<u8>>) -> Self {
        self.success_code = Some(code.into());
        self
    }

    pub fn failure(mut self, code: impl Into<Vec<u8>>) -> Self {
        self.failure_code = Some(code.into());
        self
    }

    pub fn request(mut self, code: impl Into<Vec<u8>>, handler: Arc<dyn Handler>) -> Self {
        self.requests.push((code.into(), handler));
        self
    }

    pub fn error_code(mut self, code: impl Into<Vec<u8>>, family: ErrorFamily) -> Self {
        self.error_codes.push((code.into(), family));
        self
    }

    /// Validate and freeze the definition.
    ///
    /// Every message code (success, failure, requests) must share one
    /// nonzero length and be distinct. Error codes share their own length
    /// and map one-to-one onto error families.
    pub fn build(self) -> Result<ProtocolDef, ProtocolDefError> {
        let success_code = self
            .success_code
            .ok_or(ProtocolDefError::MissingCode("success"))?;
        let failure_code = self
            .failure_code
            .ok_or(ProtocolDefError::MissingCode("failure"))?;

        let code_len = success_code.len();
        if code_len == 0 {
            return Err(ProtocolDefError::EmptyCode);
        }

        let mut seen: Vec<&[u8]> = Vec::new();
        for code in std::iter::once(&success_code)
            .chain(std::iter::once(&failure_code))
            .chain(self.requests.iter().map(|(code, _)| code))
        {
            if code.len() != code_len {
                return Err(ProtocolDefError::CodeLengthMismatch {
                    code: code.clone(),
                    got: code.len(),
                    expected: code_len,
                });
            }
            if seen.contains(&code.as_slice()) {
                return Err(ProtocolDefError::DuplicateCode(code.clone()));
            }
            seen.push(code);
        }

        let error_code_len = self
            .error_codes
            .first()
            .map(|(code, _)| code.len())
            .unwrap_or(0);
        let mut family_to_code = HashMap::new();
        let mut code_to_family = HashMap::new();
        for (code, family) in &self.error_codes {
            if code.is_empty() {
                return Err(ProtocolDefError::EmptyCode);
            }
            if code.len() != error_code_len {
                return Err(ProtocolDefError::CodeLengthMismatch {
                    code: code.clone(),
                    got: code.len(),
                    expected: error_code_len,
                });
            }
            if code_to_family.insert(code.clone(), *family).is_some() {
                return Err(ProtocolDefError::DuplicateCode(code.clone()));
            }
            if family_to_code.insert(*family, code.clone()).is_some() {
                return Err(ProtocolDefError::DuplicateFamily(*family));
            }
        }

        Ok(ProtocolDef {
            version: self.version,
            code_len,
            success_code,
            failure_code,
            handlers: self.requests.into_iter().collect(),
            error_code_len,
            family_to_code,
            code_to_family,
        })
    }
}

/// An immutable, validated protocol definition.
pub struct ProtocolDef {
    version: Vec<u8>,
    code_len: usize,
    success_code: Vec<u8>,
    failure_code: Vec<u8>,
    handlers: HashMap<Vec<u8>, Arc<dyn Handler>>,
    error_code_len: usize,
    family_to_code: HashMap<ErrorFamily, Vec<u8>>,
    code_to_family: HashMap<Vec<u8>, ErrorFamily>,
}

impl std::fmt::Debug for ProtocolDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolDef")
            .field("version", &self.version)
            .field("code_len", &self.code_len)
            .field("success_code", &self.success_code)
            .field("failure_code", &self.failure_code)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("error_code_len", &self.error_code_len)
            .finish_non_exhaustive()
    }
}

impl ProtocolDef {
    pub fn success_code(&self) -> &[u8] {
        &self.success_code
    }

    pub fn failure_code(&self) -> &[u8] {
        &self.failure_code
    }

    pub fn handler(&self, code: &[u8]) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(code)
    }

    fn is_known_code(&self, code: &[u8]) -> bool {
        code == self.success_code
            || code == self.failure_code
            || self.handlers.contains_key(code)
    }

    /// Pack one message: `VERSION ‖ CODE ‖ TOKEN ‖ BODY`.
    pub fn pack(&self, code: &[u8], token: RequestToken, body: &[u8]) -> ProtocolResult<Vec<u8>> {
        if !self.is_known_code(code) {
            return Err(ProtocolError::UnknownCode(code.to_vec()));
        }
        let mut buf =
            Vec::with_capacity(self.version.len() + self.code_len + RequestToken::LEN + body.len());
        buf.extend_from_slice(&self.version);
        buf.extend_from_slice(code);
        buf.extend_from_slice(&token.to_be_bytes());
        buf.extend_from_slice(body);
        Ok(buf)
    }

    pub fn pack_success(&self, token: RequestToken, body: &[u8]) -> Vec<u8> {
        // Success and failure codes always validate.
        self.pack(&self.success_code, token, body)
            .expect("success code is defined")
    }

    /// Pack a failure: body is `ERROR_CODE ‖ UTF-8 message`. Families the
    /// definition does not register travel as an empty body.
    pub fn pack_failure(&self, token: RequestToken, err: &RemoteError) -> Vec<u8> {
        let body = match self.family_to_code.get(&err.family) {
            Some(code) => {
                let mut body = code.clone();
                body.extend_from_slice(err.message.as_bytes());
                body
            }
            None => Vec::new(),
        };
        self.pack(&self.failure_code, token, &body)
            .expect("failure code is defined")
    }

    /// Unpack one message, checking and stripping the version prefix.
    pub fn unpack(&self, data: &[u8]) -> ProtocolResult<WireMsg> {
        let header = self.version.len() + self.code_len + RequestToken::LEN;
        if data.len() < header {
            return Err(ProtocolError::Truncated {
                have: data.len(),
                need: header,
            });
        }
        let (version, rest) = data.split_at(self.version.len());
        if version != self.version {
            return Err(ProtocolError::VersionMismatch);
        }
        let (code, rest) = rest.split_at(self.code_len);
        let (token, body) = rest.split_at(RequestToken::LEN);
        let token = RequestToken::from_be_bytes(
            token.try_into().expect("token slice is 2 bytes"),
        );
        Ok(WireMsg {
            code: code.to_vec(),
            token,
            body: body.to_vec(),
        })
    }

    /// Decode a failure body back into a [`RemoteError`].
    ///
    /// Anything that does not carry a registered error code, including the
    /// empty body, collapses into a generic request error.
    pub fn unpack_failure(&self, body: &[u8]) -> RemoteError {
        if self.error_code_len > 0 && body.len() >= self.error_code_len {
            let (code, message) = body.split_at(self.error_code_len);
            if let Some(family) = self.code_to_family.get(code) {
                return RemoteError::new(*family, String::from_utf8_lossy(message));
            }
        }
        RemoteError::new(ErrorFamily::RequestError, String::from_utf8_lossy(body))
    }
}
