use crate::{
    error::TableError,
    exchange::ExchangeId,
    history::WINDOW_DAYS,
    merge::CombinedRecord,
    observation::FundingObservation,
};
use chrono::FixedOffset;
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use fnv::FnvHashMap;
use indexmap::IndexMap;
use itertools::Itertools;
use rust_decimal::{Decimal, RoundingStrategy};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

/// Column order of the combined funding table.
pub const COMBINED_COLUMNS: [&str; 11] = [
    "exchange",
    "symbol",
    "1d",
    "2d",
    "3d",
    "5d",
    "7d",
    "datetime",
    "fundingRate",
    "interval",
    "markPrice",
];

/// First column of the plain funding rate matrix, followed by one column per exchange.
pub const MATRIX_SYMBOL_COLUMN: &str = "symbol";

/// Decimal places of plain matrix percentages.
pub const MATRIX_DECIMALS: u32 = 2;

/// Decimal places of combined table percentages & mark prices.
pub const COMBINED_DECIMALS: u32 = 4;

/// Pattern of the combined table `datetime` column, eg/ "2024/5/1 08:00:00".
pub const DATETIME_FORMAT: &str = "%Y/%-m/%-d %H:%M:%S";

const DELIMITER: u8 = b',';
const ROW_SEPARATOR: u8 = b'\n';

/// Round half away from zero to `decimals` places and render with exactly that many places.
pub fn format_decimal(value: Decimal, decimals: u32) -> String {
    let mut rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    format!("{:.*}", decimals as usize, rounded)
}

/// Render a funding rate fraction as a percentage, eg/ 0.00015 -> "0.0150" with 4 decimals.
pub fn format_percent(rate: Decimal, decimals: u32) -> String {
    format_decimal(rate * Decimal::ONE_HUNDRED, decimals)
}

/// Encode rows as delimited text. Cells containing the delimiter, a quote or a line break are
/// quoted. Rows are separated by a line feed, with no separator after the last row.
fn render_rows<R, C>(rows: R) -> Result<String, TableError>
where
    R: IntoIterator<Item = C>,
    C: IntoIterator,
    C::Item: AsRef<[u8]>,
{
    let render_error = |error: csv::Error| TableError::Render(error.to_string());

    let mut writer = WriterBuilder::new()
        .delimiter(DELIMITER)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(ROW_SEPARATOR))
        .flexible(true)
        .from_writer(Vec::new());

    for row in rows {
        writer.write_record(row).map_err(render_error)?;
    }

    let mut bytes = writer
        .into_inner()
        .map_err(|error| TableError::Render(error.error().to_string()))?;
    if bytes.last() == Some(&ROW_SEPARATOR) {
        bytes.pop();
    }

    String::from_utf8(bytes).map_err(|error| TableError::Render(error.to_string()))
}

/// Render the plain `symbol` x exchange matrix of live funding rate percentages.
///
/// Columns follow `exchanges` order, with repeated exchanges rendered once. Rows are sorted by
/// symbol. Observations from exchanges not listed are ignored, and a later observation of the
/// same (exchange, symbol) replaces an earlier one.
pub fn render_matrix(
    exchanges: &[ExchangeId],
    observations: &[FundingObservation],
) -> Result<String, TableError> {
    let exchanges = exchanges.iter().copied().unique().collect::<Vec<_>>();

    let mut matrix = BTreeMap::<&str, FnvHashMap<ExchangeId, Decimal>>::new();
    for observation in observations {
        let Some(rate) = observation.funding_rate else {
            continue;
        };
        if exchanges.contains(&observation.exchange) {
            matrix
                .entry(observation.symbol.as_str())
                .or_default()
                .insert(observation.exchange, rate);
        }
    }

    let header = std::iter::once(MATRIX_SYMBOL_COLUMN.to_string())
        .chain(exchanges.iter().map(ExchangeId::to_string))
        .collect::<Vec<_>>();

    let rows = matrix.into_iter().map(|(symbol, rates)| {
        std::iter::once(symbol.to_string())
            .chain(exchanges.iter().map(|exchange| {
                rates
                    .get(exchange)
                    .map(|rate| format_percent(*rate, MATRIX_DECIMALS))
                    .unwrap_or_default()
            }))
            .collect::<Vec<_>>()
    });

    render_rows(std::iter::once(header).chain(rows))
}

/// Render the combined table, one row per [`CombinedRecord`] in the order provided.
///
/// Missing windows and live fields render as empty cells. The `datetime` column is rendered in
/// the provided display offset.
pub fn render_combined(
    records: &[CombinedRecord],
    offset: FixedOffset,
) -> Result<String, TableError> {
    let header = COMBINED_COLUMNS.map(str::to_string).to_vec();

    let rows = records.iter().map(|record| {
        let windows = WINDOW_DAYS.into_iter().map(|days| {
            record
                .window(days)
                .map(|average| format_percent(average, COMBINED_DECIMALS))
                .unwrap_or_default()
        });

        let live = match &record.live {
            Some(live) => [
                live.time
                    .map(|time| time.with_timezone(&offset).format(DATETIME_FORMAT).to_string())
                    .unwrap_or_default(),
                live.funding_rate
                    .map(|rate| format_percent(rate, COMBINED_DECIMALS))
                    .unwrap_or_default(),
                live.interval.clone(),
                live.mark_price
                    .map(|price| format_decimal(price, COMBINED_DECIMALS))
                    .unwrap_or_default(),
            ],
            None => Default::default(),
        };

        [record.key.exchange.to_string(), record.key.symbol.clone()]
            .into_iter()
            .chain(windows)
            .chain(live)
            .collect::<Vec<_>>()
    });

    render_rows(std::iter::once(header).chain(rows))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(".tmp");
    path.with_file_name(file_name)
}

/// Atomically replace the file at `path` with `contents`.
///
/// Contents are written and synced to a sibling temp file which is then renamed over the
/// destination, so readers observe either the previous or the new file, never a partial one.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), TableError> {
    let io_error = |path: &Path, error: std::io::Error| TableError::Io {
        path: path.to_path_buf(),
        reason: error.to_string(),
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| io_error(parent, error))?;
    }

    let temp = temp_path(path);
    let written = File::create(&temp).and_then(|mut file| {
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    });

    if let Err(error) = written.and_then(|()| fs::rename(&temp, path)) {
        let _ = fs::remove_file(&temp);
        return Err(io_error(path, error));
    }

    Ok(())
}

/// Read a persisted table into rows of `column -> cell`, preserving column order.
///
/// A missing file is reported as [`TableError::Missing`]. Blank lines are skipped and both LF and
/// CRLF line endings are accepted. Rows shorter than the header are padded with empty cells, rows
/// longer than the header or invalid UTF-8 are [`TableError::Malformed`].
pub fn read_table(path: impl AsRef<Path>) -> Result<Vec<IndexMap<String, String>>, TableError> {
    let path = path.as_ref();
    let contents = fs::read(path).map_err(|error| TableError::io(path, error))?;

    let malformed = |reason: String| TableError::Malformed {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .flexible(true)
        .from_reader(contents.as_slice());

    let header = reader
        .headers()
        .map_err(|error| malformed(error.to_string()))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    reader
        .records()
        .enumerate()
        .map(|(index, record)| {
            let record = record.map_err(|error| malformed(error.to_string()))?;
            if record.len() > header.len() {
                return Err(malformed(format!(
                    "row {} has {} cells, header has {}",
                    index + 1,
                    record.len(),
                    header.len()
                )));
            }

            let mut cells = record.iter();
            Ok(header
                .iter()
                .map(|column| (column.clone(), cells.next().unwrap_or_default().to_string()))
                .collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{LiveFields, RecordKey};
    use chrono::DateTime;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_percent() {
        struct TestCase {
            input: Decimal,
            decimals: u32,
            expected: &'static str,
        }

        let tests = vec![
            // TC0: combined table precision
            TestCase { input: dec!(0.00015), decimals: 4, expected: "0.0150" },
            // TC1: matrix precision rounds half away from zero
            TestCase { input: dec!(0.00015), decimals: 2, expected: "0.02" },
            // TC2: negative midpoint rounds away from zero
            TestCase { input: dec!(-0.00015), decimals: 2, expected: "-0.02" },
            // TC3: zero renders as zero
            TestCase { input: Decimal::ZERO, decimals: 4, expected: "0.0000" },
            // TC4: tiny negative rate never renders as negative zero
            TestCase { input: dec!(-0.0000001), decimals: 2, expected: "0.00" },
            // TC5: long repeating fraction
            TestCase { input: dec!(0.0010) / dec!(7), decimals: 4, expected: "0.0143" },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = format_percent(test.input, test.decimals);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_render_rows_quotes_when_necessary() {
        struct TestCase {
            input: Vec<Vec<&'static str>>,
            expected: &'static str,
        }

        let tests = vec![
            // TC0: plain cells untouched
            TestCase { input: vec![vec!["okx", "BTC/USDT:USDT"]], expected: "okx,BTC/USDT:USDT" },
            // TC1: delimiter
            TestCase { input: vec![vec!["a,b", "c"]], expected: "\"a,b\",c" },
            // TC2: internal quotes doubled
            TestCase { input: vec![vec!["say \"hi\"", "c"]], expected: "\"say \"\"hi\"\"\",c" },
            // TC3: line break
            TestCase { input: vec![vec!["a\nb", "c"]], expected: "\"a\nb\",c" },
            // TC4: empty cells stay unquoted & rows have no trailing separator
            TestCase { input: vec![vec!["a", ""], vec!["", "b"]], expected: "a,\n,b" },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = render_rows(test.input).unwrap();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_render_matrix() {
        let observations = vec![
            FundingObservation::new(ExchangeId::Okx, "ETH/USDT:USDT", Some(dec!(0.0001))),
            FundingObservation::new(ExchangeId::Binance, "BTC/USDT:USDT", Some(dec!(0.00015))),
            FundingObservation::new(ExchangeId::Okx, "BTC/USDT:USDT", Some(dec!(-0.0002))),
            FundingObservation::new(ExchangeId::Okx, "BTC/USDT:USDT", Some(dec!(0.0003))),
            FundingObservation::new(ExchangeId::Bybit, "XRP/USDT:USDT", Some(dec!(0.0001))),
        ];

        let actual = render_matrix(&[ExchangeId::Okx, ExchangeId::Binance], &observations).unwrap();

        assert_eq!(
            actual,
            "symbol,okx,binance\nBTC/USDT:USDT,0.03,0.02\nETH/USDT:USDT,0.01,"
        );
    }

    #[test]
    fn test_render_matrix_repeated_exchange_renders_one_column() {
        let observations = vec![
            FundingObservation::new(ExchangeId::Binance, "BTC/USDT:USDT", Some(dec!(0.0001))),
            FundingObservation::new(ExchangeId::Bybit, "BTC/USDT:USDT", Some(dec!(0.0002))),
        ];

        let actual = render_matrix(
            &[ExchangeId::Binance, ExchangeId::Bybit, ExchangeId::Binance],
            &observations,
        )
        .unwrap();

        assert_eq!(actual, "symbol,binance,bybit\nBTC/USDT:USDT,0.01,0.02");
    }

    #[test]
    fn test_render_combined() {
        let time = DateTime::from_timestamp_millis(1714521600000).unwrap(); // 2024-05-01T00:00:00Z
        let records = vec![
            CombinedRecord {
                key: RecordKey::new(ExchangeId::Binance, "BTC/USDT:USDT".to_string()),
                windows: WINDOW_DAYS.into_iter().map(|days| (days, dec!(0.0001))).collect(),
                live: None,
            },
            CombinedRecord {
                key: RecordKey::new(ExchangeId::Bybit, "ETH/USDT:USDT".to_string()),
                windows: BTreeMap::new(),
                live: Some(LiveFields {
                    time: Some(time),
                    funding_rate: Some(dec!(0.00015)),
                    interval: "8h".to_string(),
                    mark_price: Some(dec!(3012.456789)),
                }),
            },
        ];

        let actual = render_combined(&records, FixedOffset::east_opt(8 * 3600).unwrap()).unwrap();

        let expected = [
            "exchange,symbol,1d,2d,3d,5d,7d,datetime,fundingRate,interval,markPrice",
            "binance,BTC/USDT:USDT,0.0100,0.0100,0.0100,0.0100,0.0100,,,,",
            "bybit,ETH/USDT:USDT,,,,,,2024/5/1 08:00:00,0.0150,8h,3012.4568",
        ]
        .join("\n");
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_read_table_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined_all_fundingfee.csv");

        assert_eq!(read_table(&path), Err(TableError::Missing(path.clone())));
    }

    #[test]
    fn test_write_atomic_then_read_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("table.csv");

        let contents = render_rows(vec![
            vec!["exchange", "symbol", "note"],
            vec!["okx", "BTC/USDT:USDT", "a,\"b\"\nc"],
            vec!["bybit", "ETH/USDT:USDT"],
        ])
        .unwrap();

        write_atomic(&path, &contents).unwrap();
        assert!(!temp_path(&path).exists());

        let rows = read_table(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["exchange", "symbol", "note"]
        );
        assert_eq!(rows[0]["note"], "a,\"b\"\nc");
        assert_eq!(rows[1]["symbol"], "ETH/USDT:USDT");
        assert_eq!(rows[1]["note"], "");

        // Rewrite fully replaces previous contents
        write_atomic(&path, "exchange,symbol").unwrap();
        assert_eq!(read_table(&path).unwrap(), Vec::<IndexMap<String, String>>::new());
    }

    #[test]
    fn test_read_table_malformed() {
        struct TestCase {
            input: &'static [u8],
            expected_malformed: bool,
        }

        let tests = vec![
            // TC0: invalid UTF-8
            TestCase { input: b"a,b\n\xff\xfe,1", expected_malformed: true },
            // TC1: row wider than header
            TestCase { input: b"a,b\n1,2,3", expected_malformed: true },
            // TC2: CRLF line endings & trailing newline
            TestCase { input: b"a,b\r\n1,2\r\n", expected_malformed: false },
            // TC3: empty file
            TestCase { input: b"", expected_malformed: false },
            // TC4: blank lines between rows
            TestCase { input: b"a,b\n\n1,2\n\n", expected_malformed: false },
        ];

        let dir = tempfile::tempdir().unwrap();
        for (index, test) in tests.into_iter().enumerate() {
            let path = dir.path().join(format!("table_{index}.csv"));
            fs::write(&path, test.input).unwrap();

            let actual = matches!(read_table(&path), Err(TableError::Malformed { .. }));
            assert_eq!(actual, test.expected_malformed, "TC{} failed", index);
        }
    }
}
