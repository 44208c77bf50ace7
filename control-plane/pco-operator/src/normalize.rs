use sha2::{Digest, Sha256};

const MAX_LABEL_LEN: usize = 63;
const HASH_LEN: usize = 8;

/// Turn a workspace identifier into a DNS-label token usable as an object
/// name and a routing path segment.
///
/// Identifiers that are already valid labels are returned unchanged. Any
/// other identifier is sanitized and suffixed with a short digest of the raw
/// input, so `Team-Alpha` and `team_alpha` never share a token.
pub fn normalize_workspace(workspace: &str) -> String {
    let base = sanitize(workspace);
    if base == workspace && base.len() <= MAX_LABEL_LEN {
        return base;
    }
    let digest = Sha256::digest(workspace.as_bytes());
    let hash: String = digest
        .iter()
        .take(HASH_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect();
    let max_base = MAX_LABEL_LEN - HASH_LEN - 1;
    let base = base[..base.len().min(max_base)].trim_end_matches('-');
    if base.is_empty() {
        format!("ws-{hash}")
    } else {
        format!("{base}-{hash}")
    }
}

fn sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_hyphen = false;
    for ch in s.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
            last_hyphen = false;
        } else if !last_hyphen {
            out.push('-');
            last_hyphen = true;
        }
    }
    out.trim_matches('-').to_string()
}

/// Ingress path routing `/<token>/...` to the tenant's backend.
pub fn route_path(token: &str) -> String {
    format!("/{token}(/|$)(.*)")
}
