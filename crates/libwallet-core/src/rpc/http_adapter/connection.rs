use std::path::Path;

use reqwest::Url;

use crate::error::RpcError;

/// Credentials from explicit user/pass, else a `user:pass` cookie file,
/// else none.
pub(super) fn resolve_auth(
    user: Option<&str>,
    pass: Option<&str>,
    cookie_file: Option<&Path>,
) -> Result<Option<(String, String)>, RpcError> {
    match (user, pass) {
        (Some(u), Some(p)) => return Ok(Some((u.to_owned(), p.to_owned()))),
        (Some(_), None) | (None, Some(_)) => {
            return Err(RpcError::InvalidConfig(
                "rpc user and rpc pass must be set together".to_owned(),
            ));
        }
        (None, None) => {}
    }

    let Some(cookie_file) = cookie_file else {
        return Ok(None);
    };

    let content = std::fs::read_to_string(cookie_file).map_err(|e| {
        RpcError::InvalidConfig(format!(
            "cannot read rpc cookie file {}: {e}",
            cookie_file.display()
        ))
    })?;
    let (cookie_user, cookie_pass) = content
        .lines()
        .next()
        .map(str::trim)
        .and_then(|line| line.split_once(':'))
        .filter(|(u, p)| !u.is_empty() && !p.is_empty())
        .ok_or_else(|| {
            RpcError::InvalidConfig(format!(
                "rpc cookie file {} must contain `username:password`",
                cookie_file.display()
            ))
        })?;

    Ok(Some((cookie_user.to_owned(), cookie_pass.to_owned())))
}

pub(super) fn parse_endpoint(endpoint: &str) -> Result<Url, RpcError> {
    let parsed = Url::parse(endpoint).map_err(|e| {
        RpcError::InvalidConfig(format!("invalid rpc endpoint `{endpoint}`: {e}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(RpcError::InvalidConfig(format!(
            "unsupported rpc endpoint scheme `{other}`; expected http or https"
        ))),
    }
}
