//! Location identifiers.
//!
//! A [`Location`] is a parsed `scheme://[login[:secret]@]host/path[?key=value&...]`
//! address. The credential rides along with the identifier so an adapter can
//! authenticate its remote calls, but it is invisible to everything else:
//! equality, hashing, `Display` and `Debug` all operate on the stripped form.
//! [`Location::to_url_string`] is the only rendering that includes the secret.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use url::{Url, form_urlencoded};

use crate::credentials::Credential;
use crate::error::{VfsError, VfsResult};

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// Characters escaped inside a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Characters escaped inside the login or secret.
const USERINFO: &AsciiSet = &SEGMENT
    .add(b':')
    .add(b';')
    .add(b'=')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'|');

/// A scheme-qualified remote address, optionally carrying a credential.
#[derive(Clone)]
pub struct Location {
    scheme: String,
    credential: Option<Credential>,
    host: String,
    segments: Vec<String>,
    properties: Vec<(String, String)>,
}

impl Location {
    /// Parse a location string.
    ///
    /// Empty segments (trailing or doubled separators) are dropped, so
    /// `smb://host/share/` and `smb://host/share` are the same location.
    pub fn parse(input: &str) -> VfsResult<Self> {
        // The error from `url` never echoes the input, so a malformed string
        // with a secret in it does not end up in a log line.
        let url = Url::parse(input)
            .map_err(|e| VfsError::invalid_location(format!("cannot parse location: {e}")))?;

        // `url` only lowercases hosts of the special schemes.
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        }
        .to_ascii_lowercase();

        let login = decode(url.username());
        let credential = match url.password() {
            Some(secret) => Some(Credential::new(login, decode(secret))),
            None if !login.is_empty() => Some(Credential::new(login, "")),
            None => None,
        };

        let segments = url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(decode)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let properties = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self {
            scheme: url.scheme().to_string(),
            credential,
            host,
            segments,
            properties,
        })
    }

    /// Build a location from its parts, without a credential.
    pub fn new<S: Into<String>>(
        scheme: impl Into<String>,
        host: impl Into<String>,
        segments: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            credential: None,
            host: host.into().to_ascii_lowercase(),
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
            properties: Vec::new(),
        }
    }

    /// Protocol tag, lowercase.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host (with port, if one was given), or the storage account for
    /// flat-namespace backends. Always lowercase.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Decoded path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of path segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Slash-joined path with a leading separator, or `""` at the host root.
    pub fn path(&self) -> String {
        self.segments
            .iter()
            .fold(String::new(), |mut acc, segment| {
                acc.push(SEPARATOR);
                acc.push_str(segment);
                acc
            })
    }

    /// Last path segment.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Value of a named property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All named properties, in the order they were given.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set a named property, replacing an earlier value for the same key.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.properties.retain(|(k, _)| *k != key);
        self.properties.push((key, value.into()));
        self
    }

    /// The embedded credential, if any.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Copy without the embedded credential.
    pub fn strip(&self) -> Self {
        Self {
            credential: None,
            ..self.clone()
        }
    }

    /// Copy with `credential` embedded in the authority.
    ///
    /// A blank login means anonymous access: the result carries no credential.
    pub fn with_credential(&self, credential: Credential) -> Self {
        let credential = (!credential.is_anonymous()).then_some(credential);
        Self {
            credential,
            ..self.clone()
        }
    }

    /// Parent location, `None` at the host root. Properties are not inherited.
    pub fn parent(&self) -> Option<Self> {
        let (_, parent) = self.segments.split_last()?;
        Some(Self {
            scheme: self.scheme.clone(),
            credential: self.credential.clone(),
            host: self.host.clone(),
            segments: parent.to_vec(),
            properties: Vec::new(),
        })
    }

    /// Child location. `name` may itself contain separators.
    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(
            name.split(SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        Self {
            scheme: self.scheme.clone(),
            credential: self.credential.clone(),
            host: self.host.clone(),
            segments,
            properties: Vec::new(),
        }
    }

    /// Render including the credential, for handing to a native client.
    pub fn to_url_string(&self) -> String {
        self.render(true)
    }

    fn render(&self, with_credential: bool) -> String {
        let mut out = format!("{}://", self.scheme);
        if let Some(credential) = self.credential.as_ref().filter(|_| with_credential) {
            out.extend(utf8_percent_encode(credential.login(), USERINFO));
            if !credential.secret().is_empty() {
                out.push(':');
                out.extend(utf8_percent_encode(credential.secret(), USERINFO));
            }
            out.push('@');
        }
        out.push_str(&self.host);
        for segment in &self.segments {
            out.push(SEPARATOR);
            out.extend(utf8_percent_encode(segment, SEGMENT));
        }
        if !self.properties.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.properties.iter())
                .finish();
            out.push('?');
            out.push_str(&query);
        }
        out
    }
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

impl FromStr for Location {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.host == other.host
            && self.segments == other.segments
            && self.properties == other.properties
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.hash(state);
        self.host.hash(state);
        self.segments.hash(state);
        self.properties.hash(state);
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("url", &self.render(false))
            .field("authenticated", &self.credential.is_some())
            .finish()
    }
}
