// Helpers for the SGS (Sistema Gerenciador de Séries Temporais) API of the
// Banco Central do Brasil.  Each series is available as csv at
// https://api.bcb.gov.br/dados/serie/bcdata.sgs.{code}/dados?formato=csv

use std::{error::Error, fmt::Display, fs, path::Path, str::FromStr};

use jiff::civil::Date;
use log::info;
use reqwest::{blocking::Client, header::USER_AGENT, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format used by the SGS API for the `data` column.
pub const SGS_DATE_FORMAT: &str = "%d/%m/%Y";

/// Header of the raw files, as published.
pub const RAW_COLUMNS: [&str; 2] = ["data", "valor"];

#[derive(Debug, Error)]
pub enum SgsError {
    #[error("download of series {code} failed with status {status}")]
    HttpStatus { code: u32, status: StatusCode },
    #[error("missing column '{0}'")]
    MissingColumn(String),
    #[error("invalid value '{value}' on row {row}")]
    InvalidValue { row: usize, value: String },
    #[error("invalid date '{value}', expected dd/mm/yyyy")]
    InvalidDate { value: String },
    #[error("unexpected columns in {path}: [{found}], expected [{expected}]")]
    SchemaMismatch {
        path: String,
        found: String,
        expected: String,
    },
}

/// The two series that make up the credit indicators dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    /// Série 21082, inadimplência da carteira de crédito, pessoas físicas.
    DefaultRate,
    /// Série 20742, taxa média de juros, pessoas físicas.
    AverageInterestRate,
}

impl Indicator {
    pub fn all() -> [Indicator; 2] {
        [Indicator::DefaultRate, Indicator::AverageInterestRate]
    }

    pub fn sgs_code(&self) -> u32 {
        match self {
            Indicator::DefaultRate => 21082,
            Indicator::AverageInterestRate => 20742,
        }
    }

    /// Business name of the `valor` column once it is loaded.
    pub const fn column_name(&self) -> &'static str {
        match self {
            Indicator::DefaultRate => "taxa_inadimplencia",
            Indicator::AverageInterestRate => "taxa_juros_media",
        }
    }

    /// Name of the raw file the series is saved to.
    pub fn file_name(&self) -> &'static str {
        match self {
            Indicator::DefaultRate => "inadimplencia.csv",
            Indicator::AverageInterestRate => "juros.csv",
        }
    }

    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/dados/serie/bcdata.sgs.{}/dados?formato=csv",
            base_url.trim_end_matches('/'),
            self.sgs_code()
        )
    }
}

impl Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (sgs {})", self.column_name(), self.sgs_code())
    }
}

/// One row as published by the SGS API.  The date is kept as text, only the
/// value is coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub data: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub valor: Decimal,
}

/// Parse a `dd/mm/yyyy` date.  The whole input must match.
pub fn parse_sgs_date(value: &str) -> Result<Date, SgsError> {
    Date::strptime(SGS_DATE_FORMAT, value).map_err(|_| SgsError::InvalidDate {
        value: value.to_string(),
    })
}

pub fn format_sgs_date(date: &Date) -> String {
    date.strftime(SGS_DATE_FORMAT).to_string()
}

/// Parse a number that uses ',' as the decimal separator, e.g. "10,25".
pub fn parse_comma_decimal(value: &str) -> Option<Decimal> {
    Decimal::from_str(&value.trim().replace(',', ".")).ok()
}

/// Parse the body returned by the SGS API: ';' separated fields, quoted,
/// with a ',' decimal separator.
///
/// ```text
/// "data";"valor"
/// "01/03/2011";"5,56"
/// ```
pub fn parse_sgs_csv(body: &str) -> Result<Vec<RawObservation>, Box<dyn Error>> {
    let body = body.trim_start_matches('\u{feff}');
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = rdr.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SgsError::MissingColumn(name.to_string()))
    };
    let i_data = position("data")?;
    let i_valor = position("valor")?;

    let mut rows: Vec<RawObservation> = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let data = record.get(i_data).unwrap_or_default();
        let valor = record.get(i_valor).unwrap_or_default();
        let valor = parse_comma_decimal(valor).ok_or_else(|| SgsError::InvalidValue {
            row: i + 1,
            value: valor.to_string(),
        })?;
        rows.push(RawObservation {
            data: data.to_string(),
            valor,
        });
    }
    Ok(rows)
}

/// Any 2xx response is accepted.
pub fn check_status(indicator: Indicator, status: StatusCode) -> Result<(), SgsError> {
    if !status.is_success() {
        return Err(SgsError::HttpStatus {
            code: indicator.sgs_code(),
            status,
        });
    }
    Ok(())
}

/// Download the full history of one series.
pub fn download_series(
    client: &Client,
    base_url: &str,
    indicator: Indicator,
) -> Result<Vec<RawObservation>, Box<dyn Error>> {
    let url = indicator.url(base_url);
    info!("downloading {}", url);
    let response = client
        .get(&url)
        .header(USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36")
        .send()?;
    check_status(indicator, response.status())?;
    let body = response.text()?;
    parse_sgs_csv(&body)
}

/// Write rows to a csv file with default separators, creating the parent
/// directory if needed.  The header is written even if there are no rows.
pub fn write_csv<T: Serialize>(
    rows: &[T],
    headers: &[&str],
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    wtr.write_record(headers)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a csv file written by [`write_csv`] back, checking that the header is
/// exactly `expected`.
pub fn read_csv<T: for<'de> Deserialize<'de>>(
    path: &Path,
    expected: &[&str],
) -> Result<Vec<T>, Box<dyn Error>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    if !headers.iter().eq(expected.iter().copied()) {
        return Err(Box::new(SgsError::SchemaMismatch {
            path: path.display().to_string(),
            found: itertools::join(headers.iter(), ", "),
            expected: expected.join(", "),
        }));
    }
    let mut rows: Vec<T> = Vec::new();
    for row in rdr.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use jiff::civil::date;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn parse_date() -> Result<(), Box<dyn Error>> {
        assert_eq!(parse_sgs_date("31/12/2023")?, date(2023, 12, 31));
        assert_eq!(parse_sgs_date("01/02/2024")?, date(2024, 2, 1));
        Ok(())
    }

    #[test]
    fn date_round_trip() -> Result<(), Box<dyn Error>> {
        for s in ["31/12/2023", "01/01/2024", "29/02/2024", "15/07/2011"] {
            assert_eq!(format_sgs_date(&parse_sgs_date(s)?), s);
        }
        Ok(())
    }

    #[test]
    fn malformed_dates_fail() {
        for s in [
            "2024-01-01",
            "31/02/2024",
            "13/13/2024",
            "01/01/2024x",
            " 01/01/2024 ",
            "",
        ] {
            let res = parse_sgs_date(s);
            assert!(
                matches!(res, Err(SgsError::InvalidDate { ref value }) if value == s),
                "expected failure for '{}'",
                s
            );
        }
    }

    #[test]
    fn comma_decimal() {
        assert_eq!(parse_comma_decimal("3,5"), Some(dec!(3.5)));
        assert_eq!(parse_comma_decimal(" 10,25 "), Some(dec!(10.25)));
        assert_eq!(parse_comma_decimal("56"), Some(dec!(56)));
        assert_eq!(parse_comma_decimal("n/a"), None);
    }

    #[test]
    fn parse_body() -> Result<(), Box<dyn Error>> {
        let body = "\u{feff}\"data\";\"valor\"\r\n\"01/03/2011\";\"5,56\"\r\n\"01/04/2011\";\"5,71\"\r\n";
        let rows = parse_sgs_csv(body)?;
        assert_eq!(
            rows,
            vec![
                RawObservation {
                    data: "01/03/2011".to_string(),
                    valor: dec!(5.56)
                },
                RawObservation {
                    data: "01/04/2011".to_string(),
                    valor: dec!(5.71)
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn parse_body_header_only() -> Result<(), Box<dyn Error>> {
        assert!(parse_sgs_csv("data;valor\n")?.is_empty());
        Ok(())
    }

    #[test]
    fn parse_body_missing_column() {
        let err = parse_sgs_csv("data;value\n01/01/2024;3,5\n").unwrap_err();
        match err.downcast_ref::<SgsError>() {
            Some(SgsError::MissingColumn(name)) => assert_eq!(name, "valor"),
            _ => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn parse_body_bad_value() {
        let err = parse_sgs_csv("data;valor\n01/01/2024;3,5\n01/02/2024;abc\n").unwrap_err();
        match err.downcast_ref::<SgsError>() {
            Some(SgsError::InvalidValue { row, value }) => {
                assert_eq!(*row, 2);
                assert_eq!(value, "abc");
            }
            _ => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn write_then_read() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Raw/juros.csv");
        let rows = vec![RawObservation {
            data: "01/01/2024".to_string(),
            valor: dec!(10.2),
        }];
        write_csv(&rows, &RAW_COLUMNS, &path)?;
        assert_eq!(std::fs::read_to_string(&path)?, "data,valor\n01/01/2024,10.2\n");
        let back: Vec<RawObservation> = read_csv(&path, &RAW_COLUMNS)?;
        assert_eq!(back, rows);
        Ok(())
    }

    #[test]
    fn status_codes() {
        assert!(check_status(Indicator::DefaultRate, StatusCode::OK).is_ok());
        assert!(check_status(Indicator::DefaultRate, StatusCode::NON_AUTHORITATIVE_INFORMATION).is_ok());
        for status in [
            StatusCode::NOT_FOUND,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::MOVED_PERMANENTLY,
        ] {
            match check_status(Indicator::AverageInterestRate, status) {
                Err(SgsError::HttpStatus { code, status: s }) => {
                    assert_eq!(code, 20742);
                    assert_eq!(s, status);
                }
                res => panic!("unexpected result {:?}", res),
            }
        }
    }

    #[test]
    fn urls() {
        assert_eq!(
            Indicator::DefaultRate.url("https://api.bcb.gov.br/"),
            "https://api.bcb.gov.br/dados/serie/bcdata.sgs.21082/dados?formato=csv"
        );
        assert_eq!(
            Indicator::AverageInterestRate.url("https://api.bcb.gov.br"),
            "https://api.bcb.gov.br/dados/serie/bcdata.sgs.20742/dados?formato=csv"
        );
    }

    #[ignore]
    #[test]
    fn download_test() -> Result<(), Box<dyn Error>> {
        let client = Client::new();
        let rows = download_series(&client, "https://api.bcb.gov.br", Indicator::DefaultRate)?;
        assert!(!rows.is_empty());
        parse_sgs_date(&rows[0].data)?;
        Ok(())
    }
}
