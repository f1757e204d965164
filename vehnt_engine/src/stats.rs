//! Client for the hnt-explorer delegation statistics API

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Request, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::constants::SubDao;
use crate::error::{EngineError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("vehnt-engine/", env!("CARGO_PKG_VERSION"));

fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub avg_hnt: f64,
    pub avg_lockup: f64,
    pub avg_vehnt: f64,
    pub median_hnt: f64,
    pub median_lockup: f64,
    pub median_vehnt: f64,
}

/// Sub-DAO wide totals. `hnt` and `vehnt` are native amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Total {
    pub count: u64,
    pub fall_rate: f64,
    pub hnt: f64,
    pub lockup: f64,
    pub vehnt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubDaoStakes {
    pub stats: Stats,
    pub total: Total,
}

/// `/delegated_stakes/info`: one entry per sub-DAO name plus the snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedStakesInfo {
    pub timestamp: i64,
    #[serde(flatten)]
    pub sub_daos: BTreeMap<String, SubDaoStakes>,
}

impl DelegatedStakesInfo {
    pub fn sub_dao(&self, sub_dao: SubDao) -> Result<&SubDaoStakes> {
        self.sub_daos.get(sub_dao.as_str()).ok_or_else(|| {
            EngineError::InvalidInput(format!("no delegation stats for {}", sub_dao))
        })
    }
}

/// One delegated position as reported by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedStake {
    pub delegated_position_key: String,
    pub duration_s: i64,
    pub end_ts: i64,
    pub hnt_amount: f64,
    pub last_claimed_epoch: u64,
    pub lockup_type: String,
    pub position_key: String,
    pub purged: bool,
    pub start_ts: i64,
    pub sub_dao: String,
    pub vehnt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedStakes {
    #[serde(alias = "delegated_positions")]
    pub positions: Vec<DelegatedStake>,
    pub positions_total_len: u64,
    pub timestamp: i64,
}

/// Pagination for `/delegated_stakes`. `timestamp` pins the snapshot so that
/// later pages stay consistent with the first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StakesQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl StakesQuery {
    /// Query for the page after `page`, pinned to its snapshot
    pub fn next_page(page: &DelegatedStakes, start: u64) -> Self {
        Self {
            limit: None,
            start: Some(start),
            timestamp: Some(page.timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochInfo {
    pub epoch: u64,
    pub iot_dc_burned: f64,
    pub iot_delegation_rewards_issued: f64,
    pub iot_rewards_issued_at: String,
    pub iot_utility_score: f64,
    pub iot_vehnt_at_epoch_start: f64,
    pub iot_vehnt_in_closing_positions: f64,
    pub mobile_dc_burned: f64,
    pub mobile_delegation_rewards_issued: f64,
    pub mobile_rewards_issued_at: String,
    pub mobile_utility_score: f64,
    pub mobile_vehnt_at_epoch_start: f64,
    pub mobile_vehnt_in_closing_positions: f64,
}

impl EpochInfo {
    pub fn vehnt_at_epoch_start(&self, sub_dao: SubDao) -> f64 {
        match sub_dao {
            SubDao::Iot => self.iot_vehnt_at_epoch_start,
            SubDao::Mobile => self.mobile_vehnt_at_epoch_start,
        }
    }
}

/// veHNT delegated to one sub-DAO at the start of an epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochVehnt {
    pub epoch: u64,
    pub vehnt: f64,
}

/// Per-epoch series for `sub_dao`, ordered by epoch
pub fn vehnt_by_epoch(epochs: &[EpochInfo], sub_dao: SubDao) -> Vec<EpochVehnt> {
    let mut series: Vec<EpochVehnt> = epochs
        .iter()
        .map(|e| EpochVehnt {
            epoch: e.epoch,
            vehnt: e.vehnt_at_epoch_start(sub_dao),
        })
        .collect();
    series.sort_by_key(|e| e.epoch);
    series
}

pub struct StatsClient {
    client: Client,
    base_url: String,
}

impl StatsClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Build the `/delegated_stakes` request without sending it
    pub fn delegated_stakes_request(&self, query: &StakesQuery) -> Result<Request> {
        Ok(self
            .client
            .get(self.endpoint("delegated_stakes"))
            .query(query)
            .build()?)
    }

    fn delegated_stakes_csv_request(&self, query: &StakesQuery) -> Result<Request> {
        Ok(self
            .client
            .get(self.endpoint("delegated_stakes/csv"))
            .query(query)
            .build()?)
    }

    fn delegated_stakes_info_request(&self) -> Result<Request> {
        Ok(self.client.get(self.endpoint("delegated_stakes/info")).build()?)
    }

    fn epoch_info_request(&self) -> Result<Request> {
        Ok(self.client.get(self.endpoint("epochs/info")).build()?)
    }

    pub async fn delegated_stakes_info(&self) -> Result<DelegatedStakesInfo> {
        let request = self.delegated_stakes_info_request()?;
        self.execute_json(request).await
    }

    pub async fn delegated_stakes(&self, query: &StakesQuery) -> Result<DelegatedStakes> {
        let request = self.delegated_stakes_request(query)?;
        self.execute_json(request).await
    }

    pub async fn delegated_stakes_csv(&self, query: &StakesQuery) -> Result<String> {
        let request = self.delegated_stakes_csv_request(query)?;
        let response = self.execute(request).await?;
        Ok(response.text().await?)
    }

    pub async fn epoch_info(&self) -> Result<Vec<EpochInfo>> {
        let request = self.epoch_info_request()?;
        self.execute_json(request).await
    }

    async fn execute(&self, request: Request) -> Result<reqwest::Response> {
        let url = request.url().to_string();
        debug!(%url, "Requesting delegation stats");

        let response = self.client.execute(request).await?;
        check_status(&url, response.status())?;
        Ok(response)
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        let response = self.execute(request).await?;
        Ok(response.json::<T>().await?)
    }
}

fn check_status(url: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(EngineError::Network(format!("{} returned {}", url, status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = r#"{
        "timestamp": 1690000000,
        "iot": {
            "stats": {
                "avg_hnt": 1.5, "avg_lockup": 2.0, "avg_vehnt": 3.0,
                "median_hnt": 1.0, "median_lockup": 1.0, "median_vehnt": 2.0
            },
            "total": {
                "count": 10, "fall_rate": 0.5, "hnt": 1000, "lockup": 5,
                "vehnt": 200000000000
            }
        },
        "mobile": {
            "stats": {
                "avg_hnt": 0, "avg_lockup": 0, "avg_vehnt": 0,
                "median_hnt": 0, "median_lockup": 0, "median_vehnt": 0
            },
            "total": { "count": 0, "fall_rate": 0, "hnt": 0, "lockup": 0, "vehnt": 0 }
        }
    }"#;

    const STAKES: &str = r#"{
        "positions": [{
            "delegated_position_key": "d1",
            "duration_s": 86400,
            "end_ts": 1700000000,
            "hnt_amount": 100,
            "last_claimed_epoch": 19500,
            "lockup_type": "cliff",
            "position_key": "p1",
            "purged": false,
            "start_ts": 1690000000,
            "sub_dao": "iot",
            "vehnt": 12345
        }],
        "positions_total_len": 1,
        "timestamp": 1690000000
    }"#;

    #[test]
    fn test_parse_delegated_stakes_info() {
        let info: DelegatedStakesInfo = serde_json::from_str(INFO).unwrap();
        assert_eq!(info.timestamp, 1_690_000_000);
        assert_eq!(info.sub_daos.len(), 2);

        let iot = info.sub_dao(SubDao::Iot).unwrap();
        assert_eq!(iot.total.count, 10);
        assert_eq!(iot.total.vehnt, 200_000_000_000.0);
        assert_eq!(iot.stats.avg_hnt, 1.5);
    }

    #[test]
    fn test_missing_sub_dao_stats() {
        let mut info: DelegatedStakesInfo = serde_json::from_str(INFO).unwrap();
        info.sub_daos.remove("mobile");
        assert!(matches!(
            info.sub_dao(SubDao::Mobile),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_delegated_stakes() {
        let stakes: DelegatedStakes = serde_json::from_str(STAKES).unwrap();
        assert_eq!(stakes.positions.len(), 1);
        assert_eq!(stakes.positions[0].lockup_type, "cliff");

        let legacy = STAKES.replacen("\"positions\"", "\"delegated_positions\"", 1);
        let stakes: DelegatedStakes = serde_json::from_str(&legacy).unwrap();
        assert_eq!(stakes.positions_total_len, 1);
    }

    #[test]
    fn test_query_string_is_well_formed() {
        let client = StatsClient::new("https://stats.example.com/v1/").unwrap();
        assert_eq!(client.base_url(), "https://stats.example.com/v1");

        let request = client.delegated_stakes_request(&StakesQuery::default()).unwrap();
        assert_eq!(request.url().as_str(), "https://stats.example.com/v1/delegated_stakes");

        let query = StakesQuery {
            limit: Some(500),
            start: Some(500),
            timestamp: Some(1_690_000_000),
        };
        let request = client.delegated_stakes_request(&query).unwrap();
        assert_eq!(
            request.url().query(),
            Some("limit=500&start=500&timestamp=1690000000")
        );
    }

    #[test]
    fn test_endpoint_urls() {
        let client = StatsClient::new("https://stats.example.com/v1").unwrap();

        let info = client.delegated_stakes_info_request().unwrap();
        assert_eq!(info.url().as_str(), "https://stats.example.com/v1/delegated_stakes/info");

        let epochs = client.epoch_info_request().unwrap();
        assert_eq!(epochs.url().as_str(), "https://stats.example.com/v1/epochs/info");

        let csv = client
            .delegated_stakes_csv_request(&StakesQuery::default())
            .unwrap();
        assert_eq!(csv.url().as_str(), "https://stats.example.com/v1/delegated_stakes/csv");

        let query = StakesQuery {
            limit: None,
            start: Some(1000),
            timestamp: Some(1_690_000_000),
        };
        let csv = client.delegated_stakes_csv_request(&query).unwrap();
        assert_eq!(csv.url().query(), Some("start=1000&timestamp=1690000000"));
        assert_eq!(csv.method(), reqwest::Method::GET);
    }

    fn epoch(epoch: u64, iot: f64, mobile: f64) -> EpochInfo {
        EpochInfo {
            epoch,
            iot_dc_burned: 0.0,
            iot_delegation_rewards_issued: 0.0,
            iot_rewards_issued_at: String::new(),
            iot_utility_score: 0.0,
            iot_vehnt_at_epoch_start: iot,
            iot_vehnt_in_closing_positions: 0.0,
            mobile_dc_burned: 0.0,
            mobile_delegation_rewards_issued: 0.0,
            mobile_rewards_issued_at: String::new(),
            mobile_utility_score: 0.0,
            mobile_vehnt_at_epoch_start: mobile,
            mobile_vehnt_in_closing_positions: 0.0,
        }
    }

    #[test]
    fn test_vehnt_by_epoch_is_ordered_per_sub_dao() {
        let epochs = vec![
            epoch(19_502, 3.0, 30.0),
            epoch(19_500, 1.0, 10.0),
            epoch(19_501, 2.0, 20.0),
        ];

        let iot = vehnt_by_epoch(&epochs, SubDao::Iot);
        let iot_epochs: Vec<u64> = iot.iter().map(|e| e.epoch).collect();
        assert_eq!(iot_epochs, vec![19_500, 19_501, 19_502]);
        assert_eq!(iot[0].vehnt, 1.0);

        let mobile = vehnt_by_epoch(&epochs, SubDao::Mobile);
        assert_eq!(mobile[2].vehnt, 30.0);
        assert!(vehnt_by_epoch(&[], SubDao::Iot).is_empty());
    }

    #[test]
    fn test_next_page_pins_timestamp() {
        let page: DelegatedStakes = serde_json::from_str(STAKES).unwrap();
        let query = StakesQuery::next_page(&page, 500);
        assert_eq!(query.timestamp, Some(1_690_000_000));
        assert_eq!(query.start, Some(500));
        assert_eq!(query.limit, None);
    }

    #[test]
    fn test_non_success_status_is_network_error() {
        assert!(check_status("u", StatusCode::OK).is_ok());
        let err = check_status("u", StatusCode::SERVICE_UNAVAILABLE).unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("503"));
    }
}
