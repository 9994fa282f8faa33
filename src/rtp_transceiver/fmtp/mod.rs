use std::collections::HashMap;

/// Fmtp is a parsed `a=fmtp` line, used to decide whether a remote codec is
/// the same configuration as one of ours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fmtp {
    /// RFC 6184 H264, where packetization-mode and the profile part of
    /// profile-level-id must agree.
    H264(HashMap<String, String>),
    /// Everything else: shared keys must carry equal values.
    Generic {
        mime_type: String,
        parameters: HashMap<String, String>,
    },
}

/// parse parses an fmtp string based on the MimeType
pub(crate) fn parse(mime_type: &str, line: &str) -> Fmtp {
    let mut parameters = HashMap::new();
    for p in line.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = match p.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (p, ""),
        };
        parameters.insert(key.to_lowercase(), value.to_owned());
    }

    if mime_type.eq_ignore_ascii_case("video/h264") {
        Fmtp::H264(parameters)
    } else {
        Fmtp::Generic {
            mime_type: mime_type.to_lowercase(),
            parameters,
        }
    }
}

fn profile_prefix(profile_level_id: &str) -> Option<(u8, u8)> {
    if profile_level_id.len() < 4 || !profile_level_id.is_char_boundary(4) {
        return None;
    }
    let profile_idc = u8::from_str_radix(&profile_level_id[0..2], 16).ok()?;
    let profile_iop = u8::from_str_radix(&profile_level_id[2..4], 16).ok()?;
    Some((profile_idc, profile_iop))
}

fn parameters_consistent(a: &HashMap<String, String>, b: &HashMap<String, String>) -> bool {
    a.iter().all(|(k, v)| match b.get(k) {
        Some(vb) => vb.eq_ignore_ascii_case(v),
        None => true,
    })
}

impl Fmtp {
    pub(crate) fn parameter(&self, key: &str) -> Option<&String> {
        match self {
            Fmtp::H264(parameters) => parameters.get(key),
            Fmtp::Generic { parameters, .. } => parameters.get(key),
        }
    }

    /// match_fmtp reports whether two fmtp descriptions describe a compatible
    /// codec configuration.
    pub(crate) fn match_fmtp(&self, other: &Fmtp) -> bool {
        match (self, other) {
            (Fmtp::H264(a), Fmtp::H264(b)) => {
                let (Some(a_mode), Some(b_mode)) =
                    (a.get("packetization-mode"), b.get("packetization-mode"))
                else {
                    return false;
                };
                if a_mode != b_mode {
                    return false;
                }

                match (
                    a.get("profile-level-id").and_then(|p| profile_prefix(p)),
                    b.get("profile-level-id").and_then(|p| profile_prefix(p)),
                ) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            (
                Fmtp::Generic {
                    mime_type: a_mime,
                    parameters: a,
                },
                Fmtp::Generic {
                    mime_type: b_mime,
                    parameters: b,
                },
            ) => a_mime == b_mime && parameters_consistent(a, b),
            _ => false,
        }
    }
}
