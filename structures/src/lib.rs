use std::collections::HashMap;

#[macro_use]
extern crate serde_derive;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Dimensions { width, height }
    }
}

/// Identity -> quota table gating who may place pixels.
#[derive(Debug, PartialEq, Eq, Clone, Default, Deserialize, Serialize)]
pub struct Whitelist {
    pub quotas: HashMap<String, u16>,
}

impl Whitelist {
    pub fn quota(&self, identity: &str) -> Option<u16> {
        self.quotas.get(identity).copied()
    }

    pub fn len(&self) -> usize {
        self.quotas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotas.is_empty()
    }
}

impl FromIterator<(String, u16)> for Whitelist {
    fn from_iter<I: IntoIterator<Item = (String, u16)>>(iter: I) -> Self {
        Whitelist {
            quotas: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ContentKind {
    Image,
    Text,
}

impl ContentKind {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentKind::Image => "image/png",
            ContentKind::Text => "text/plain",
        }
    }
}

/// Password-grant body sent to the identity provider.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct AuthUser {
    pub id: String,
}

#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub user: AuthUser,
}
