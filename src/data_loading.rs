use crate::Signal;
use anyhow::{anyhow, Context, Result};
use encoding_rs::{SHIFT_JIS, UTF_8};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::Path;

const TIME_COLUMNS: [&str; 5] = ["time", "time_s", "t", "sec", "seconds"];
const SENSOR_NAME_KEY: &str = "センサ名";
const SAMPLING_RATE_KEY: &str = "サンプリング周波数";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decode raw file bytes, trying Shift_JIS (cp932) strictly, then UTF-8 with
/// the BOM removed, and finally UTF-8 with replacement characters.
///
/// Returns the text and a label for the encoding that was used.
pub fn decode_text(bytes: &[u8]) -> (String, &'static str) {
    // 0xEF 0xBB is unmapped in cp932, so a UTF-8 BOM never decodes as Shift_JIS
    if !bytes.starts_with(UTF8_BOM) {
        if let Some(text) = SHIFT_JIS.decode_without_bom_handling_and_without_replacement(bytes) {
            return (text.into_owned(), "cp932");
        }
    }
    let (text, had_errors) = UTF_8.decode_with_bom_removal(bytes);
    if had_errors {
        warn!("Input is neither cp932 nor UTF-8, undecodable bytes replaced");
        (text.into_owned(), "utf-8 (errors=replace)")
    } else {
        (text.into_owned(), "utf-8-sig")
    }
}

/// Load one EMG channel from a CSV export.
///
/// `fs` is used unless the file declares its own sampling rate.
pub fn load_signal(path: &Path, fs: f64) -> Result<Signal> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let (text, encoding) = decode_text(&bytes);
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("signal.csv");

    info!("Loading {} ({})", path.display(), encoding);
    parse_emg_csv(&text, filename, fs, encoding)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse either a sensor export (metadata lines, then a table whose header
/// starts with `No`) or a plain table with a header row.
pub fn parse_emg_csv(text: &str, filename: &str, fs: f64, encoding: &str) -> Result<Signal> {
    let lines: Vec<&str> = text.lines().collect();
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string();

    let mut meta = BTreeMap::new();
    meta.insert("encoding".to_string(), encoding.to_string());
    meta.insert("source_filename".to_string(), filename.to_string());

    let table_start = lines
        .iter()
        .position(|l| l.starts_with("No,") || l.starts_with("No\t"));

    match table_start {
        Some(start) => parse_sensor_export(&lines, start, stem, fs, meta),
        None => parse_plain_table(text, stem, fs, meta),
    }
}

fn parse_sensor_export(
    lines: &[&str],
    start: usize,
    stem: String,
    mut fs: f64,
    mut meta: BTreeMap<String, String>,
) -> Result<Signal> {
    let name = lines
        .iter()
        .take(80)
        .filter(|l| l.starts_with(SENSOR_NAME_KEY))
        .find_map(|l| {
            let parts: Vec<&str> = l.split(',').map(str::trim).collect();
            parts.get(1).filter(|p| !p.is_empty()).map(|p| p.to_string())
        })
        .unwrap_or(stem);
    meta.insert("sensor_name".to_string(), name.clone());

    if let Some(file_fs) = lines
        .iter()
        .take(120)
        .filter(|l| l.contains(SAMPLING_RATE_KEY))
        .find_map(|l| {
            l.split(',')
                .map(str::trim)
                .find(|p| is_plain_number(p))
                .and_then(|p| p.parse::<f64>().ok())
        })
    {
        debug!("Sampling rate {} Hz read from file", file_fs);
        fs = file_fs;
        meta.insert("fs_from_file".to_string(), file_fs.to_string());
    }

    let delimiter = if lines[start].starts_with("No\t") {
        b'\t'
    } else {
        b','
    };
    let body = lines[start..].join("\n");
    let (headers, columns) = read_columns(&body, delimiter)?;

    let no_col = headers
        .iter()
        .position(|h| h == "No")
        .ok_or_else(|| anyhow!("Could not find 'No' column after header"))?;
    let value_col = headers
        .iter()
        .position(|h| h.contains("電圧") || h.contains("mV") || h.to_lowercase().contains("voltage"))
        .or(if headers.len() > 1 { Some(1) } else { None })
        .ok_or_else(|| anyhow!("Sensor table has no value column"))?;

    let numbers = &columns[no_col];
    if let Some(row) = numbers.iter().position(|v| !v.is_finite()) {
        return Err(anyhow!("Sample number on data row {} is not numeric", row + 1));
    }
    let t = numbers.iter().map(|no| (no - 1.0) / fs).collect();
    let x = columns[value_col].clone();

    meta.insert("format".to_string(), "sensor_style".to_string());
    meta.insert("value_col".to_string(), headers[value_col].clone());
    Ok(Signal::new(name, fs, t, x, meta)?)
}

fn parse_plain_table(
    text: &str,
    stem: String,
    fs: f64,
    mut meta: BTreeMap<String, String>,
) -> Result<Signal> {
    let (headers, columns) = read_columns(text, b',')?;
    if headers.is_empty() {
        return Err(anyhow!("CSV has no header row"));
    }

    let time_col = headers
        .iter()
        .position(|h| TIME_COLUMNS.contains(&h.to_lowercase().as_str()));

    let (t, value_col) = match time_col {
        Some(tc) => {
            let value_col = (0..headers.len())
                .find(|&c| c != tc)
                .ok_or_else(|| anyhow!("CSV has a time column but no signal column"))?;
            meta.insert("format".to_string(), "table".to_string());
            meta.insert("time_col".to_string(), headers[tc].clone());
            (columns[tc].clone(), value_col)
        }
        None => {
            let value_col = if headers.len() > 1 { 1 } else { 0 };
            let idx = &columns[0];
            let first = idx.first().copied().unwrap_or(0.0);
            meta.insert("format".to_string(), "table_no_time".to_string());
            meta.insert("index_col".to_string(), headers[0].clone());
            (idx.iter().map(|i| (i - first) / fs).collect(), value_col)
        }
    };

    meta.insert("value_col".to_string(), headers[value_col].clone());
    Ok(Signal::new(stem, fs, t, columns[value_col].clone(), meta)?)
}

/// Trimmed headers and one numeric vector per column; cells that do not
/// parse become NaN.
fn read_columns(text: &str, delimiter: u8) -> Result<(Vec<String>, Vec<Vec<f64>>)> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut columns = vec![Vec::new(); headers.len()];

    for result in rdr.records() {
        let record = result?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        for (c, column) in columns.iter_mut().enumerate() {
            let value = record
                .get(c)
                .and_then(|cell| cell.trim().parse::<f64>().ok())
                .unwrap_or(f64::NAN);
            column.push(value);
        }
    }

    debug!(
        "Read {} columns x {} rows",
        headers.len(),
        columns.first().map(Vec::len).unwrap_or(0)
    );
    Ok((headers, columns))
}

/// Unsigned decimal such as `1000` or `1000.0`.
fn is_plain_number(s: &str) -> bool {
    let mut parts = s.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_ok = match parts.next() {
        Some(frac) => !frac.is_empty() && frac.bytes().all(|b| b.is_ascii_digit()),
        None => true,
    };
    !int_part.is_empty() && int_part.bytes().all(|b| b.is_ascii_digit()) && frac_ok
}
