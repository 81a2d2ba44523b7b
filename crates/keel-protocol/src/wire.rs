use std::fmt;

/// 16-bit request/response correlation token, unique per connection while
/// the request is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestToken(pub u16);

impl RequestToken {
    /// Byte length on the wire.
    pub const LEN: usize = 2;

    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn to_be_bytes(self) -> [u8; Self::LEN] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token:{:#06x}", self.0)
    }
}

/// A decoded wire message: code, token, body. The version prefix has been
/// checked and stripped by this point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireMsg {
    pub code: Vec<u8>,
    pub token: RequestToken,
    pub body: Vec<u8>,
}
