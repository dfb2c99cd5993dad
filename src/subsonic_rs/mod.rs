use color_eyre::eyre::{Result, WrapErr};
use rand::Rng;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use url::Url;

pub mod playlist;
pub mod scan;
pub mod search;

pub use playlist::{SubsonicPlaylist, create_playlist, get_playlists, replace_playlist_tracks};
pub use scan::{SubsonicScanStatus, get_scan_status, start_scan};
pub use search::{SubsonicSong, search3};

/// Docs:
/// https://www.subsonic.org/pages/api.jsp
/// https://opensubsonic.netlify.app/docs/api-reference/
pub const API_VERSION: &str = "1.16.1";
pub const CLIENT_ID: &str = "discovery-sync";

/// Credentials for a Subsonic compatible server (Navidrome, Gonic, ...).
#[derive(Debug, Clone)]
pub struct SubsonicAuth {
    base_url: Url,
    pub username: String,
    pub password: String,
}

impl SubsonicAuth {
    pub fn new(base_url: Url, username: impl Into<String>, password: impl Into<String>) -> Self {
        // `Url::join` drops the last path segment unless it ends with a slash,
        // which breaks servers mounted under a prefix like `/navidrome`.
        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            base_url,
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Errors reported inside a `subsonic-response` envelope.
#[derive(Debug, thiserror::Error)]
pub enum SubsonicError {
    #[error("Subsonic {method} failed with code {code}: {message}")]
    Api {
        method: String,
        code: i64,
        message: String,
    },

    #[error("Subsonic {method} returned a response without `subsonic-response`")]
    MissingEnvelope { method: String },
}

fn make_salt() -> String {
    let bytes: [u8; 8] = rand::thread_rng().r#gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Token auth: `t = md5(password + salt)` with a fresh salt per request.
fn auth_params(auth: &SubsonicAuth) -> Vec<(&'static str, String)> {
    let salt = make_salt();
    let token = format!("{:x}", md5::compute(format!("{}{}", auth.password, salt)));
    vec![
        ("u", auth.username.clone()),
        ("t", token),
        ("s", salt),
        ("v", API_VERSION.to_string()),
        ("c", CLIENT_ID.to_string()),
        ("f", "json".to_string()),
    ]
}

pub fn api_url(auth: &SubsonicAuth, method: &str, params: &[(&str, String)]) -> Result<Url> {
    let mut url = auth
        .base_url
        .join(&format!("rest/{method}"))
        .wrap_err_with(|| format!("Failed to build Subsonic URL for {method}"))?;

    {
        let mut query = url.query_pairs_mut();
        for (key, value) in auth_params(auth) {
            query.append_pair(key, &value);
        }
        // Repeated keys (songId) are how Subsonic takes lists.
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }

    Ok(url)
}

/// Unwrap the `subsonic-response` envelope and deserialize its body.
pub fn parse_response<T: DeserializeOwned>(method: &str, payload: Value) -> Result<T> {
    let Some(inner) = payload.get("subsonic-response") else {
        return Err(SubsonicError::MissingEnvelope {
            method: method.to_string(),
        }
        .into());
    };

    let status = inner.get("status").and_then(Value::as_str).unwrap_or_default();
    if status != "ok" {
        let error = inner.get("error");
        return Err(SubsonicError::Api {
            method: method.to_string(),
            code: error
                .and_then(|e| e.get("code"))
                .and_then(Value::as_i64)
                .unwrap_or_default(),
            message: error
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("server returned a failed status")
                .to_string(),
        }
        .into());
    }

    serde_json::from_value(inner.clone())
        .wrap_err_with(|| format!("Failed to deserialize Subsonic {method} response"))
}

/// `GET /rest/{method}` with auth, returning the decoded envelope body.
pub async fn request<T: DeserializeOwned>(
    client: &Client,
    auth: &SubsonicAuth,
    method: &str,
    params: &[(&str, String)],
) -> Result<T> {
    let url = api_url(auth, method, params)?;

    let payload = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await
        .wrap_err_with(|| format!("Subsonic {method} request failed"))?
        .error_for_status()?
        .json::<Value>()
        .await
        .wrap_err_with(|| format!("Subsonic {method} response was not JSON"))?;

    parse_response(method, payload)
}

/// Body of responses that carry nothing but the status.
#[derive(Debug, Clone, Deserialize)]
pub struct Empty {}

/// `GET /rest/ping`
pub async fn ping(client: &Client, auth: &SubsonicAuth) -> Result<()> {
    request::<Empty>(client, auth, "ping", &[]).await?;
    Ok(())
}

/// Subsonic JSON collapses one element lists into a bare object.
pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn auth() -> SubsonicAuth {
        SubsonicAuth::new(
            Url::parse("http://localhost:4533/navidrome").unwrap(),
            "admin",
            "sesame",
        )
    }

    #[test]
    fn test_api_url_keeps_path_prefix_and_token_auth() {
        let url = api_url(&auth(), "ping", &[]).unwrap();
        assert_eq!(url.path(), "/navidrome/rest/ping");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        let salt = get("s");
        assert_eq!(get("u"), "admin");
        assert_eq!(get("v"), API_VERSION);
        assert_eq!(get("f"), "json");
        assert_eq!(
            get("t"),
            format!("{:x}", md5::compute(format!("sesame{salt}")))
        );
        assert!(pairs.iter().all(|(k, _)| k != "p"));
    }

    #[test]
    fn test_api_url_repeats_list_params() {
        let url = api_url(
            &auth(),
            "createPlaylist",
            &[
                ("playlistId", "7".to_string()),
                ("songId", "a".to_string()),
                ("songId", "b".to_string()),
            ],
        )
        .unwrap();

        let song_ids: Vec<_> = url
            .query_pairs()
            .filter(|(k, _)| k == "songId")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(song_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_salt_changes_per_request() {
        assert_ne!(make_salt(), make_salt());
    }

    #[test]
    fn test_parse_failed_envelope() {
        let payload = json!({
            "subsonic-response": {
                "status": "failed",
                "version": "1.16.1",
                "error": { "code": 40, "message": "Wrong username or password" }
            }
        });

        let err = parse_response::<Empty>("ping", payload).unwrap_err();
        let err = err.downcast::<SubsonicError>().unwrap();
        match err {
            SubsonicError::Api { code, message, .. } => {
                assert_eq!(code, 40);
                assert_eq!(message, "Wrong username or password");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_missing_envelope() {
        let result = parse_response::<Empty>("ping", json!({ "status": "ok" }));
        assert!(result.is_err());
    }
}
