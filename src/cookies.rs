use axum::http::{header, HeaderMap, HeaderValue};

pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const OAUTH2_AUTH_REQUEST_COOKIE: &str = "oauth2_auth_request";

/// `Set-Cookie` value for an HttpOnly cookie scoped to the whole site.
pub fn build(name: &str, value: &str, max_age_secs: u64) -> anyhow::Result<HeaderValue> {
    let cookie = format!("{name}={value}; Path=/; Max-Age={max_age_secs}; HttpOnly; SameSite=Lax");
    Ok(HeaderValue::from_str(&cookie)?)
}

/// `Set-Cookie` value that makes the browser drop `name`.
pub fn expire(name: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("{name}=; Path=/; Max-Age=0; HttpOnly"))
        .unwrap_or_else(|_| HeaderValue::from_static("invalid=; Max-Age=0"))
}

pub fn read(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_sets_http_only_and_max_age() {
        let v = build(REFRESH_TOKEN_COOKIE, "abc.def.ghi", 1_209_600).unwrap();
        let s = v.to_str().unwrap();
        assert!(s.starts_with("refresh_token=abc.def.ghi;"));
        assert!(s.contains("Max-Age=1209600"));
        assert!(s.contains("HttpOnly"));
        assert!(s.contains("Path=/"));
    }

    #[test]
    fn read_finds_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; oauth2_auth_request=xyz; lang=ko"),
        );
        assert_eq!(read(&headers, OAUTH2_AUTH_REQUEST_COOKIE).as_deref(), Some("xyz"));
        assert_eq!(read(&headers, REFRESH_TOKEN_COOKIE), None);
    }

    #[test]
    fn expire_zeroes_max_age() {
        let s = expire(REFRESH_TOKEN_COOKIE);
        assert!(s.to_str().unwrap().contains("Max-Age=0"));
    }
}
