//! CSV plumbing shared by workbook sheets and report exports.
//!
//! - **Delimiter resolution**: `.tsv` files read tab-separated, everything
//!   else comma-separated.
//! - **Encoding**: sheet files are decoded through `encoding_rs`, defaulting
//!   to UTF-8; exports are always written as UTF-8.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::error::{EtlError, Result};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| EtlError::UnknownEncoding(value.to_string())),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    }
}

pub fn is_delimited_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("csv") || ext.eq_ignore_ascii_case("tsv")
    )
}

pub fn open_csv_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(open_csv_reader(
        BufReader::new(file),
        resolve_input_delimiter(path),
    ))
}

pub fn open_csv_writer(path: &Path) -> Result<csv::Writer<Box<dyn Write>>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file: Box<dyn Write> = Box::new(BufWriter::new(File::create(path)?));
    Ok(csv::WriterBuilder::new()
        .delimiter(resolve_input_delimiter(path))
        .quote_style(QuoteStyle::Necessary)
        .from_writer(file))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(EtlError::Decode(encoding.name()))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R: Read>(
    reader: &mut csv::Reader<R>,
    path: &Path,
    encoding: &'static Encoding,
) -> Result<Vec<String>> {
    let headers = reader
        .byte_headers()
        .map_err(|source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    decode_record(&headers, encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn tsv_extension_selects_tab() {
        assert_eq!(resolve_input_delimiter(&PathBuf::from("a.TSV")), b'\t');
        assert_eq!(resolve_input_delimiter(&PathBuf::from("a.csv")), b',');
    }

    #[test]
    fn latin1_bytes_decode_with_explicit_label() {
        let encoding = resolve_encoding(Some("latin1")).expect("encoding");
        let decoded = decode_bytes(b"Lota\xe7\xe3o", encoding).expect("decode");
        assert_eq!(decoded, "Lotação");
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        assert!(matches!(
            resolve_encoding(Some("klingon")),
            Err(EtlError::UnknownEncoding(_))
        ));
    }
}
