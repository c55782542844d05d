//! Log file formats: CSV, TSV, and Excel-compatible CSV.
//!
//! The Excel dialect differs in three ways: a UTF-8 BOM as the first bytes of
//! the file, CRLF line endings everywhere, and conservative field quoting
//! (any field containing a separator, quote, CR, or LF is quoted with
//! embedded quotes doubled). Plain CSV/TSV are written unquoted because no
//! produced field can contain a separator.

use chrono::{DateTime, SecondsFormat, Utc};
use netft_proto::SampleRecord;

use crate::units::{force_from_newtons, torque_from_newton_meters, ForceUnit, TorqueUnit};

pub const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Csv,
    Tsv,
    ExcelCompatible,
}

impl LogFormat {
    pub fn extension(self) -> &'static str {
        match self {
            LogFormat::Csv | LogFormat::ExcelCompatible => "csv",
            LogFormat::Tsv => "tsv",
        }
    }

    pub fn separator(self) -> char {
        match self {
            LogFormat::Csv | LogFormat::ExcelCompatible => ',',
            LogFormat::Tsv => '\t',
        }
    }

    pub fn newline(self) -> &'static str {
        match self {
            LogFormat::Csv | LogFormat::Tsv => "\n",
            LogFormat::ExcelCompatible => "\r\n",
        }
    }

    pub fn has_bom(self) -> bool {
        matches!(self, LogFormat::ExcelCompatible)
    }
}

/// Session facts written into every part's metadata block.
#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub serial: Option<String>,
    pub firmware: Option<String>,
    pub counts_per_force: f64,
    pub counts_per_torque: f64,
    pub started_utc: DateTime<Utc>,
    pub force_unit: ForceUnit,
    pub torque_unit: TorqueUnit,
    pub filter_cutoff_hz: Option<f64>,
}

/// Anchors monotonic sample timestamps to the wall clock.
///
/// Captured once per recording session; each row's UTC stamp is derived as
/// `wall + (t_mono_ns - mono_ns)` so rows stay consistent with the session
/// metadata even if the system clock steps mid-recording.
#[derive(Debug, Clone, Copy)]
pub struct TimeRef {
    pub wall: DateTime<Utc>,
    pub mono_ns: u64,
}

impl TimeRef {
    pub fn row_utc(&self, t_mono_ns: u64) -> DateTime<Utc> {
        let delta_ns = t_mono_ns as i64 - self.mono_ns as i64;
        self.wall + chrono::Duration::nanoseconds(delta_ns)
    }
}

fn quote_excel(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\r') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn join_fields(format: LogFormat, fields: &[String]) -> String {
    let sep = format.separator().to_string();
    match format {
        LogFormat::ExcelCompatible => fields
            .iter()
            .map(|f| quote_excel(f))
            .collect::<Vec<_>>()
            .join(&sep),
        _ => fields.join(&sep),
    }
}

/// Column-name row, without trailing newline. Engineering columns carry the
/// configured display unit in brackets.
pub fn column_header(format: LogFormat, force_unit: ForceUnit, torque_unit: TorqueUnit) -> String {
    let fu = force_unit.label();
    let tu = torque_unit.label();
    let fields = vec![
        "timestamp".to_string(),
        "t_mono_ns".to_string(),
        "rdt_sequence".to_string(),
        "ft_sequence".to_string(),
        "status".to_string(),
        format!("Fx [{fu}]"),
        format!("Fy [{fu}]"),
        format!("Fz [{fu}]"),
        format!("Tx [{tu}]"),
        format!("Ty [{tu}]"),
        format!("Tz [{tu}]"),
    ];
    join_fields(format, &fields)
}

/// Metadata comment block, each line `# key: value`, without trailing newline
/// after the last line.
pub fn metadata_block(format: LogFormat, meta: &SessionMeta) -> String {
    let nl = format.newline();
    let mut lines: Vec<String> = Vec::new();
    if let Some(serial) = &meta.serial {
        lines.push(format!("# serial: {serial}"));
    }
    if let Some(firmware) = &meta.firmware {
        lines.push(format!("# firmware: {firmware}"));
    }
    lines.push(format!("# counts_per_force: {}", meta.counts_per_force));
    lines.push(format!("# counts_per_torque: {}", meta.counts_per_torque));
    lines.push(format!(
        "# session_start: {}",
        meta.started_utc.to_rfc3339_opts(SecondsFormat::Micros, true)
    ));
    lines.push(format!("# force_unit: {}", meta.force_unit.label()));
    lines.push(format!("# torque_unit: {}", meta.torque_unit.label()));
    match meta.filter_cutoff_hz {
        Some(cutoff) => lines.push(format!("# filter: low-pass {cutoff} Hz")),
        None => lines.push("# filter: off".to_string()),
    }
    lines.join(nl)
}

/// Everything a new part starts with: BOM (Excel only), metadata comments,
/// and the column-name row, each line terminated with the dialect newline.
pub fn file_header(format: LogFormat, meta: &SessionMeta) -> String {
    let nl = format.newline();
    let mut out = String::new();
    if format.has_bom() {
        out.push_str(UTF8_BOM);
    }
    out.push_str(&metadata_block(format, meta));
    out.push_str(nl);
    out.push_str(&column_header(format, meta.force_unit, meta.torque_unit));
    out.push_str(nl);
    out
}

/// One data row including the trailing newline.
///
/// Unconverted records (no SI fields) produce empty engineering columns; the
/// processing stage always converts, so this only shows up if a raw record is
/// fed to the writer directly.
pub fn format_row(
    format: LogFormat,
    rec: &SampleRecord,
    time_ref: &TimeRef,
    force_unit: ForceUnit,
    torque_unit: TorqueUnit,
) -> String {
    let mut fields = vec![
        time_ref
            .row_utc(rec.t_mono_ns)
            .to_rfc3339_opts(SecondsFormat::Micros, true),
        rec.t_mono_ns.to_string(),
        rec.rdt_sequence.to_string(),
        rec.ft_sequence.to_string(),
        rec.status.to_string(),
    ];
    match rec.force_n {
        Some(force) => {
            for f in force {
                fields.push(format!("{:.6}", force_from_newtons(f, force_unit)));
            }
        }
        None => fields.extend(std::iter::repeat(String::new()).take(3)),
    }
    match rec.torque_nm {
        Some(torque) => {
            for t in torque {
                fields.push(format!("{:.6}", torque_from_newton_meters(t, torque_unit)));
            }
        }
        None => fields.extend(std::iter::repeat(String::new()).take(3)),
    }
    let mut row = join_fields(format, &fields);
    row.push_str(format.newline());
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta() -> SessionMeta {
        SessionMeta {
            serial: Some("FT12345".into()),
            firmware: Some("2.0.18".into()),
            counts_per_force: 1_000_000.0,
            counts_per_torque: 1_000_000.0,
            started_utc: Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap(),
            force_unit: ForceUnit::N,
            torque_unit: TorqueUnit::Nm,
            filter_cutoff_hz: None,
        }
    }

    fn converted_rec() -> SampleRecord {
        let mut rec = SampleRecord::raw(1_500_000, 42, 99, 0, [1000, -1000, 5000, 100, -100, 50]);
        rec.force_n = Some([0.001, -0.001, 0.005]);
        rec.torque_nm = Some([0.0001, -0.0001, 0.00005]);
        rec
    }

    #[test]
    fn csv_header_carries_units_in_brackets() {
        let header = column_header(LogFormat::Csv, ForceUnit::Lbf, TorqueUnit::LbfIn);
        assert!(header.contains("Fx [lbf]"));
        assert!(header.contains("Tz [lbf-in]"));
        assert!(header.starts_with("timestamp,t_mono_ns,rdt_sequence,ft_sequence,status,"));
    }

    #[test]
    fn tsv_uses_tabs_and_lf() {
        let row = format_row(
            LogFormat::Tsv,
            &converted_rec(),
            &TimeRef {
                wall: meta().started_utc,
                mono_ns: 0,
            },
            ForceUnit::N,
            TorqueUnit::Nm,
        );
        assert!(row.contains('\t'));
        assert!(!row.contains(','));
        assert!(row.ends_with('\n'));
        assert!(!row.ends_with("\r\n"));
    }

    #[test]
    fn excel_header_starts_with_bom_and_uses_crlf() {
        let header = file_header(LogFormat::ExcelCompatible, &meta());
        assert!(header.starts_with(UTF8_BOM));
        assert_eq!(header.as_bytes()[..3], [0xEF, 0xBB, 0xBF]);
        // Every line break is CRLF.
        assert_eq!(header.matches('\n').count(), header.matches("\r\n").count());
    }

    #[test]
    fn excel_quotes_fields_with_separators() {
        assert_eq!(quote_excel("plain"), "plain");
        assert_eq!(quote_excel("a,b"), "\"a,b\"");
        assert_eq!(quote_excel("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(quote_excel("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn row_timestamp_is_utc_iso8601_from_time_ref() {
        let tref = TimeRef {
            wall: Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap(),
            mono_ns: 1_000_000,
        };
        let row = format_row(
            LogFormat::Csv,
            &converted_rec(),
            &tref,
            ForceUnit::N,
            TorqueUnit::Nm,
        );
        // t_mono_ns 1_500_000 is 0.5 ms after the anchor.
        assert!(row.starts_with("2026-03-14T15:09:26.000500Z,"), "row: {row}");
    }

    #[test]
    fn row_engineering_columns_use_display_units() {
        let tref = TimeRef {
            wall: meta().started_utc,
            mono_ns: 0,
        };
        let row = format_row(
            LogFormat::Csv,
            &converted_rec(),
            &tref,
            ForceUnit::N,
            TorqueUnit::Nmm,
        );
        let fields: Vec<&str> = row.trim_end().split(',').collect();
        assert_eq!(fields.len(), 11);
        assert_eq!(fields[5], "0.001000");
        assert_eq!(fields[8], "0.100000"); // 0.0001 Nm = 0.1 Nmm
    }

    #[test]
    fn metadata_block_lists_session_facts() {
        let block = metadata_block(LogFormat::Csv, &meta());
        assert!(block.contains("# serial: FT12345"));
        assert!(block.contains("# counts_per_force: 1000000"));
        assert!(block.contains("# session_start: 2026-03-14T15:09:26.000000Z"));
        assert!(block.contains("# filter: off"));
        assert!(block.lines().all(|l| l.starts_with("# ")));
    }
}
