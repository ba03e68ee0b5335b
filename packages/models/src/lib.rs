#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report types, report jobs, and the file-to-table mapping.
//!
//! The portal offers a fixed set of reports ([`ReportType`]). Each
//! downloaded report is renamed to a canonical file name bound to its type,
//! and [`TableMapping`] resolves that name back to the type and on to the
//! destination warehouse table.

use std::path::PathBuf;

use strum::IntoEnumIterator as _;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// File extension of exported reports.
pub const CSV_EXTENSION: &str = "csv";

/// One of the report categories offered by the portal.
///
/// Ordering follows the portal's report list and is the order jobs run in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ReportType {
    /// Media report (clicks, impressions per creative).
    Midia,
    /// Player registrations.
    Registros,
    /// Earnings.
    Ganhos,
    /// Player activity.
    Atividades,
}

impl ReportType {
    /// Every report type in portal order.
    pub const ALL: [Self; 4] = [Self::Midia, Self::Registros, Self::Ganhos, Self::Atividades];

    /// Visible text of the report's link in the portal.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Midia => "Relatório de Mídia",
            Self::Registros => "Relatório de Registros",
            Self::Ganhos => "Relatório de Ganhos",
            Self::Atividades => "Relatório de atividades",
        }
    }

    /// Short identifier used in file and table names.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Midia => "midia",
            Self::Registros => "registros",
            Self::Ganhos => "ganhos",
            Self::Atividades => "atividades",
        }
    }

    /// Name the downloaded file is renamed to once complete.
    #[must_use]
    pub fn canonical_file_name(self) -> String {
        format!("{}.{CSV_EXTENSION}", self.slug())
    }
}

/// A single report to fetch: which report, over which period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportJob {
    /// The report to generate.
    pub report_type: ReportType,
    /// Visible text of the date-range option (e.g. `"Ontem"`).
    pub date_range: String,
}

impl ReportJob {
    /// Creates a job for one report.
    #[must_use]
    pub fn new(report_type: ReportType, date_range: &str) -> Self {
        Self {
            report_type,
            date_range: date_range.to_owned(),
        }
    }

    /// Builds the fixed, ordered job list for a run.
    #[must_use]
    pub fn all_for(date_range: &str) -> Vec<Self> {
        ReportType::iter()
            .map(|report_type| Self::new(report_type, date_range))
            .collect()
    }
}

/// A downloaded report that finished writing and carries its type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFile {
    /// Location of the renamed file in the download directory.
    pub path: PathBuf,
    /// The report this file was exported from.
    pub report_type: ReportType,
}

/// Result of one report job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The report had data and was downloaded.
    Downloaded(CompletedFile),
    /// The portal offered no export for the period. Not an error.
    NoData(ReportType),
}

impl JobOutcome {
    /// The report this outcome belongs to.
    #[must_use]
    pub const fn report_type(&self) -> ReportType {
        match self {
            Self::Downloaded(file) => file.report_type,
            Self::NoData(report_type) => *report_type,
        }
    }

    /// The downloaded file, if any.
    #[must_use]
    pub const fn file(&self) -> Option<&CompletedFile> {
        match self {
            Self::Downloaded(file) => Some(file),
            Self::NoData(_) => None,
        }
    }
}

/// Static association between canonical file names, report types, and
/// destination table names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    prefix: String,
}

impl TableMapping {
    /// Prefix shared by every destination table.
    pub const DEFAULT_PREFIX: &'static str = "relatorio_";

    /// Creates a mapping with a custom table prefix.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
        }
    }

    /// Resolves a canonical file name (e.g. `"midia.csv"`) to its report.
    ///
    /// Returns `None` for any other name, including differently-cased ones.
    #[must_use]
    pub fn resolve(&self, file_name: &str) -> Option<ReportType> {
        ReportType::iter().find(|report_type| report_type.canonical_file_name() == file_name)
    }

    /// Destination table name for a report, e.g. `relatorio_midia`.
    #[must_use]
    pub fn table_name(&self, report_type: ReportType) -> String {
        format!("{}{}", self.prefix, report_type.slug())
    }
}

impl Default for TableMapping {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX)
    }
}
