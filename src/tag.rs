//! Record tag enumeration.
//!
//! The set of tags is fixed at build time. Lookup by name is
//! case-insensitive and accepts any unique prefix, so `requrl` and `ReqUR`
//! both resolve to [`Tag::ReqUrl`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

macro_rules! define_tags {
    ($($variant:ident => $name:literal,)*) => {
        /// Kind of a log record.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Tag {
            $(
                #[doc = concat!("`", $name, "` record.")]
                $variant,
            )*
        }

        impl Tag {
            /// Every tag, in id order.
            pub const ALL: &'static [Tag] = &[$(Tag::$variant,)*];

            /// Canonical name as it appears in the log.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Tag::$variant => $name,)*
                }
            }
        }
    };
}

define_tags! {
    Debug => "Debug",
    Error => "Error",
    Cli => "CLI",
    SessOpen => "SessOpen",
    SessClose => "SessClose",
    BogoHeader => "BogoHeader",
    Ttl => "TTL",
    FetchBody => "Fetch_Body",
    VclAcl => "VCL_acl",
    VclCall => "VCL_call",
    VclTrace => "VCL_trace",
    VclReturn => "VCL_return",
    ReqStart => "ReqStart",
    Hit => "Hit",
    HitPass => "HitPass",
    HitMiss => "HitMiss",
    ExpBan => "ExpBan",
    ExpKill => "ExpKill",
    WorkThread => "WorkThread",
    EsiXmlError => "ESI_xmlerror",
    Hash => "Hash",
    BackendHealth => "Backend_health",
    VclLog => "VCL_Log",
    VclError => "VCL_Error",
    Gzip => "Gzip",
    Link => "Link",
    Begin => "Begin",
    End => "End",
    Vsl => "VSL",
    Storage => "Storage",
    Timestamp => "Timestamp",
    ReqAcct => "ReqAcct",
    PipeAcct => "PipeAcct",
    BereqAcct => "BereqAcct",
    VfpAcct => "VfpAcct",
    Witness => "Witness",
    BackendOpen => "BackendOpen",
    BackendClose => "BackendClose",
    HttpGarbage => "HttpGarbage",
    Proxy => "Proxy",
    ProxyGarbage => "ProxyGarbage",
    VclUse => "VCL_use",
    Filters => "Filters",
    SessError => "SessError",
    FetchError => "FetchError",
    ReqMethod => "ReqMethod",
    ReqUrl => "ReqURL",
    ReqProtocol => "ReqProtocol",
    ReqStatus => "ReqStatus",
    ReqReason => "ReqReason",
    ReqHeader => "ReqHeader",
    ReqUnset => "ReqUnset",
    ReqLost => "ReqLost",
    RespMethod => "RespMethod",
    RespUrl => "RespURL",
    RespProtocol => "RespProtocol",
    RespStatus => "RespStatus",
    RespReason => "RespReason",
    RespHeader => "RespHeader",
    RespUnset => "RespUnset",
    RespLost => "RespLost",
    BereqMethod => "BereqMethod",
    BereqUrl => "BereqURL",
    BereqProtocol => "BereqProtocol",
    BereqStatus => "BereqStatus",
    BereqReason => "BereqReason",
    BereqHeader => "BereqHeader",
    BereqUnset => "BereqUnset",
    BereqLost => "BereqLost",
    BerespMethod => "BerespMethod",
    BerespUrl => "BerespURL",
    BerespProtocol => "BerespProtocol",
    BerespStatus => "BerespStatus",
    BerespReason => "BerespReason",
    BerespHeader => "BerespHeader",
    BerespUnset => "BerespUnset",
    BerespLost => "BerespLost",
    ObjMethod => "ObjMethod",
    ObjUrl => "ObjURL",
    ObjProtocol => "ObjProtocol",
    ObjStatus => "ObjStatus",
    ObjReason => "ObjReason",
    ObjHeader => "ObjHeader",
    ObjUnset => "ObjUnset",
    ObjLost => "ObjLost",
    H2RxHdr => "H2RxHdr",
    H2RxBody => "H2RxBody",
    H2TxHdr => "H2TxHdr",
    H2TxBody => "H2TxBody",
    Batch => "Batch",
}

impl Tag {
    /// Internal markers are never user-addressable and never evaluated.
    #[must_use]
    pub const fn is_internal(self) -> bool {
        matches!(self, Self::Batch)
    }

    /// Numeric id of this tag.
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Resolves a tag name: exact (case-insensitive) first, then unique prefix.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::UnknownTag {
                name: name.to_string(),
            });
        }

        let mut candidate = None;
        let mut ambiguous = false;
        for &tag in Self::ALL.iter().filter(|t| !t.is_internal()) {
            let full = tag.name();
            if full.eq_ignore_ascii_case(name) {
                return Ok(tag);
            }
            if starts_with_ignore_case(full, name) {
                if candidate.is_some() {
                    ambiguous = true;
                }
                candidate = Some(tag);
            }
        }

        match candidate {
            Some(_) if ambiguous => Err(ConfigError::AmbiguousTag {
                name: name.to_string(),
            }),
            Some(tag) => Ok(tag),
            None => Err(ConfigError::UnknownTag {
                name: name.to_string(),
            }),
        }
    }

    /// Expands one tag-list element; a trailing `*` matches every tag
    /// with that prefix.
    pub fn glob(pattern: &str) -> Result<Vec<Self>, ConfigError> {
        if let Some(prefix) = pattern.strip_suffix('*') {
            let tags: Vec<Self> = Self::ALL
                .iter()
                .copied()
                .filter(|t| !t.is_internal() && starts_with_ignore_case(t.name(), prefix))
                .collect();
            if tags.is_empty() {
                return Err(ConfigError::UnknownTag {
                    name: pattern.to_string(),
                });
            }
            return Ok(tags);
        }
        Self::from_name(pattern).map(|t| vec![t])
    }

    /// Parses a comma-separated tag list such as `ReqURL,Resp*`.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, ConfigError> {
        let mut out = Vec::new();
        for item in list.split(',').map(str::trim) {
            if item.is_empty() {
                return Err(ConfigError::Syntax {
                    reason: format!("empty element in tag list '{list}'"),
                });
            }
            for tag in Self::glob(item)? {
                if !out.contains(&tag) {
                    out.push(tag);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
