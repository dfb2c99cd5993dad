use color_eyre::eyre::Result;
use reqwest::Client;
use serde::Deserialize;

use super::{SubsonicAuth, request};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SubsonicScanStatus {
    #[serde(default)]
    pub scanning: bool,
    #[serde(default)]
    pub count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScanStatusResponse {
    #[serde(rename = "scanStatus", default)]
    scan_status: SubsonicScanStatus,
}

/// Trigger a library scan.
///
/// Endpoint: `GET /rest/startScan[?target={library_id}:{path}&fullScan=false]`
///
/// The target restricts Navidrome to a single folder. Servers that don't know
/// the parameter ignore it and scan everything.
pub async fn start_scan(
    client: &Client,
    auth: &SubsonicAuth,
    target: Option<&str>,
) -> Result<SubsonicScanStatus> {
    let mut params = vec![("fullScan", "false".to_string())];
    if let Some(target) = target {
        params.push(("target", target.to_string()));
    }

    let res: ScanStatusResponse = request(client, auth, "startScan", &params).await?;
    Ok(res.scan_status)
}

/// Endpoint: `GET /rest/getScanStatus`
pub async fn get_scan_status(client: &Client, auth: &SubsonicAuth) -> Result<SubsonicScanStatus> {
    let res: ScanStatusResponse = request(client, auth, "getScanStatus", &[]).await?;
    Ok(res.scan_status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsonic_rs::parse_response;
    use serde_json::json;

    #[test]
    fn test_parse_scan_status() {
        let payload = json!({
            "subsonic-response": {
                "status": "ok",
                "scanStatus": { "scanning": true, "count": 1234, "folderCount": 80 }
            }
        });

        let res: ScanStatusResponse = parse_response("getScanStatus", payload).unwrap();
        assert!(res.scan_status.scanning);
        assert_eq!(res.scan_status.count, Some(1234));
    }
}
