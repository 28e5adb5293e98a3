// Household credit indicators published by the Banco Central do Brasil.
// Series 21082 (default rate) and 20742 (average interest rate) are
// downloaded, joined on the reference date and loaded into DuckDB.

use duckdb::{AccessMode, Connection};
use jiff::civil::Date;
use log::info;
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::lib_sgs::{
    download_series, parse_sgs_date, read_csv, write_csv, Indicator, RawObservation, SgsError,
    RAW_COLUMNS,
};
use crate::utils::lib_duckdb::open_with_retry;

/// Header of the consolidated file and column order of the table.
pub const CONSOLIDATED_COLUMNS: [&str; 3] = [
    "data_ref",
    Indicator::DefaultRate.column_name(),
    Indicator::AverageInterestRate.column_name(),
];

/// Number of decimals kept by the rate columns, `DECIMAL(18,6)`.
pub const RATE_SCALE: u32 = 6;

#[derive(Debug, Clone)]
pub struct CreditIndicatorsArchive {
    pub base_dir: String,
    pub duckdb_path: String,
    pub table_name: String,
    /// Root of the SGS api, e.g. `https://api.bcb.gov.br`
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub data_ref: Date,
    #[serde(with = "rust_decimal::serde::str")]
    pub taxa_inadimplencia: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub taxa_juros_media: Decimal,
}

/// Quote a table name for DuckDB.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fail on the first rate with more decimals than the table keeps, so that
/// nothing gets rounded on insert.  Rows are numbered from 1.
fn check_scale(rows: &[Row]) -> Result<(), SgsError> {
    for (i, row) in rows.iter().enumerate() {
        for value in [row.taxa_inadimplencia, row.taxa_juros_media] {
            if value.scale() > RATE_SCALE {
                return Err(SgsError::InvalidValue {
                    row: i + 1,
                    value: value.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Rename the generic `data`/`valor` pair and parse the dates.  Fails on the
/// first date that is not `dd/mm/yyyy`.
fn to_series(
    indicator: Indicator,
    rows: &[RawObservation],
) -> Result<Vec<(Date, Decimal)>, SgsError> {
    info!(
        "renaming data -> data_ref, valor -> {} ({} rows)",
        indicator.column_name(),
        rows.len()
    );
    rows.iter()
        .map(|row| parse_sgs_date(&row.data).map(|date| (date, row.valor)))
        .collect()
}

/// Inner join of the two series on the reference date.  Output rows follow
/// the order of the default rate series.  A date repeated in one of the
/// series produces one row per combination.
pub fn consolidate(
    default_rate: &[RawObservation],
    interest_rate: &[RawObservation],
) -> Result<Vec<Row>, SgsError> {
    let left = to_series(Indicator::DefaultRate, default_rate)?;
    let right = to_series(Indicator::AverageInterestRate, interest_rate)?;

    let mut rates: HashMap<Date, Vec<Decimal>> = HashMap::new();
    for (date, value) in right {
        rates.entry(date).or_default().push(value);
    }

    let mut out: Vec<Row> = Vec::new();
    for (date, default_rate) in left {
        if let Some(values) = rates.get(&date) {
            for interest_rate in values {
                out.push(Row {
                    data_ref: date,
                    taxa_inadimplencia: default_rate,
                    taxa_juros_media: *interest_rate,
                });
            }
        }
    }
    Ok(out)
}

impl CreditIndicatorsArchive {
    /// Path of the raw csv file for one series.  Does not check if the file exists.
    pub fn raw_filename(&self, indicator: Indicator) -> PathBuf {
        Path::new(&self.base_dir).join("Raw").join(indicator.file_name())
    }

    pub fn consolidated_filename(&self) -> PathBuf {
        Path::new(&self.base_dir).join("credito_consolidado.csv")
    }

    /// Download both series and save them with default csv separators.
    /// Data is published monthly.
    pub fn download_files(&self) -> Result<(), Box<dyn Error>> {
        info!("starting extraction ...");
        let client = Client::new();
        for indicator in Indicator::all() {
            let rows = download_series(&client, &self.base_url, indicator)?;
            let path = self.raw_filename(indicator);
            write_csv(&rows, &RAW_COLUMNS, &path)?;
            info!(
                "  saved {} rows of {} to {}",
                rows.len(),
                indicator,
                path.display()
            );
        }
        info!("done");
        Ok(())
    }

    pub fn read_raw_file(&self, indicator: Indicator) -> Result<Vec<RawObservation>, Box<dyn Error>> {
        read_csv(&self.raw_filename(indicator), &RAW_COLUMNS)
    }

    pub fn read_consolidated_file(&self) -> Result<Vec<Row>, Box<dyn Error>> {
        read_csv(&self.consolidated_filename(), &CONSOLIDATED_COLUMNS)
    }

    /// Join the two raw files into the consolidated file.  Return the number
    /// of rows written.
    pub fn transform(&self) -> Result<usize, Box<dyn Error>> {
        info!("starting transformation ...");
        let default_rate = self.read_raw_file(Indicator::DefaultRate)?;
        let interest_rate = self.read_raw_file(Indicator::AverageInterestRate)?;
        let rows = consolidate(&default_rate, &interest_rate)?;

        let path = self.consolidated_filename();
        write_csv(&rows, &CONSOLIDATED_COLUMNS, &path)?;
        info!(
            "joined {} x {} rows into {} rows, saved to {}",
            default_rate.len(),
            interest_rate.len(),
            rows.len(),
            path.display()
        );
        if let (Some(first), Some(last)) = (rows.first(), rows.last()) {
            info!("  dates from {} to {}", first.data_ref, last.data_ref);
        }
        Ok(rows.len())
    }

    /// Replace the table with the content of the consolidated file.  The file
    /// is read into a temporary table first, then the table is recreated and
    /// filled, all in one transaction.  If anything fails the old table is
    /// left untouched.
    pub fn update_duckdb(&self) -> Result<usize, Box<dyn Error>> {
        info!("loading into table {} of {} ...", self.table_name, self.duckdb_path);
        let path = self.consolidated_filename();
        // check the header, the types and the scale before touching the database
        let rows = self.read_consolidated_file()?;
        check_scale(&rows)?;

        let mut conn = open_with_retry(
            Path::new(&self.duckdb_path),
            8,
            Duration::from_millis(25),
            AccessMode::ReadWrite,
        )?;

        let sql = format!(
            r#"
CREATE TEMPORARY TABLE tmp
AS
    SELECT data_ref, taxa_inadimplencia, taxa_juros_media
    FROM read_csv('{file}',
        header = true,
        delim = ',',
        columns = {{
            'data_ref': 'DATE',
            'taxa_inadimplencia': 'DECIMAL(18,6)',
            'taxa_juros_media': 'DECIMAL(18,6)'
        }}
    )
;

CREATE OR REPLACE TABLE {table} (
    data_ref DATE NOT NULL,
    taxa_inadimplencia DECIMAL(18,6) NOT NULL,
    taxa_juros_media DECIMAL(18,6) NOT NULL,
);

INSERT INTO {table}
    SELECT * FROM tmp
    ORDER BY data_ref;

DROP TABLE tmp;
            "#,
            table = quote_ident(&self.table_name),
            file = path.display().to_string().replace('\'', "''"),
        );
        // println!("{}", sql);

        let tx = conn.transaction()?;
        tx.execute_batch(&sql)?;
        let count: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {};", quote_ident(&self.table_name)),
            [],
            |row| row.get(0),
        )?;
        tx.commit()?;

        info!(
            "load finished into table '{}'.  Total rows: {} (file had {})",
            self.table_name,
            count,
            rows.len()
        );
        Ok(count as usize)
    }

    /// Get all the rows in the table, ordered by date.
    pub fn get_data(&self, conn: &Connection) -> Result<Vec<Row>, Box<dyn Error>> {
        let query = format!(
            r#"
SELECT
    data_ref::VARCHAR,
    taxa_inadimplencia::VARCHAR,
    taxa_juros_media::VARCHAR
FROM {}
ORDER BY data_ref;
    "#,
            quote_ident(&self.table_name)
        );
        let mut stmt = conn.prepare(&query)?;
        let res_iter = stmt.query_map([], |row| {
            Ok((
                row.get::<usize, String>(0)?,
                row.get::<usize, String>(1)?,
                row.get::<usize, String>(2)?,
            ))
        })?;
        let mut rows: Vec<Row> = Vec::new();
        for res in res_iter {
            let (data_ref, default_rate, interest_rate) = res?;
            rows.push(Row {
                data_ref: data_ref.parse()?,
                taxa_inadimplencia: Decimal::from_str(&default_rate)?,
                taxa_juros_media: Decimal::from_str(&interest_rate)?,
            });
        }
        Ok(rows)
    }

    /// Extract, transform and load, in sequence.  Return the number of rows
    /// in the table.
    pub fn run_all(&self) -> Result<usize, Box<dyn Error>> {
        self.download_files()?;
        self.transform()?;
        self.update_duckdb()
    }
}
