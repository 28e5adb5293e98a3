use std::env;

use crate::db::bcb::credit_indicators_archive::CreditIndicatorsArchive;

pub struct ProdDb {}

impl ProdDb {
    /// Locations default to the production layout.  Each one can be
    /// overridden with an environment variable, e.g. from `.env/test.env`.
    pub fn bcb_credit_indicators() -> CreditIndicatorsArchive {
        Self::bcb_credit_indicators_with(|key| env::var(key).ok())
    }

    pub fn bcb_credit_indicators_with<F>(lookup: F) -> CreditIndicatorsArchive
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        CreditIndicatorsArchive {
            base_dir: get("BCB_BASE_DIR", "/opt/airflow/data"),
            duckdb_path: get("BCB_DUCKDB_PATH", "/opt/airflow/data/bcb_credit.duckdb"),
            table_name: get("BCB_TABLE_NAME", "indicadores_credito_bcb"),
            base_url: get("BCB_SGS_URL", "https://api.bcb.gov.br"),
        }
    }
}
