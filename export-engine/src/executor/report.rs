//! Human and machine readable reports of an export run.

use crate::executor::backup::{Backup, BackupDescription};
use crate::executor::snapshot::{Snapshot, SnapshotDescription};
use crate::models::InstanceRecord;
use crate::utils::errors::ExportError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Common interface of [`Backup`] and [`Snapshot`] results.
pub trait ExportReport {
    /// Instance slug, empty for a fleet backup
    fn slug(&self) -> &str;

    fn start_time(&self) -> DateTime<Utc>;

    /// Write the plain-text report.
    fn report_plain(&self, w: &mut dyn Write) -> io::Result<()>;

    /// Write the report as JSON.
    fn report_machine(&self, w: &mut dyn Write) -> crate::Result<()>;
}

fn err_string(err: &Option<ExportError>) -> Option<String> {
    err.as_ref().map(ToString::to_string)
}

fn err_map(errors: &BTreeMap<String, Option<ExportError>>) -> BTreeMap<String, Option<String>> {
    errors.iter().map(|(k, v)| (k.clone(), err_string(v))).collect()
}

fn display(err: &Option<ExportError>) -> String {
    match err {
        Some(err) => err.to_string(),
        None => "none".to_string(),
    }
}

fn write_errors(w: &mut dyn Write, title: &str, errors: &BTreeMap<String, Option<ExportError>>) -> io::Result<()> {
    writeln!(w, "{title}:")?;
    for (name, err) in errors {
        writeln!(w, "  {name}: {}", display(err))?;
    }
    Ok(())
}

fn no_files(manifest: &&[String]) -> bool {
    manifest.is_empty()
}

fn write_json<T: Serialize>(w: &mut dyn Write, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *w, value)?;
    writeln!(w)
}

#[derive(Serialize)]
struct SnapshotJson<'a> {
    description: &'a SnapshotDescription,
    instance: &'a InstanceRecord,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    err_panic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    err_stop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    err_start: Option<String>,
    whitebox_errors: BTreeMap<String, Option<String>>,
    blackbox_errors: BTreeMap<String, Option<String>>,
    logs: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "no_files")]
    manifest: &'a [String],
}

impl<'a> From<&'a Snapshot> for SnapshotJson<'a> {
    fn from(s: &'a Snapshot) -> Self {
        Self {
            description: &s.description,
            instance: &s.instance,
            start_time: s.start_time,
            end_time: s.end_time,
            err_panic: err_string(&s.err_panic),
            err_stop: err_string(&s.err_stop),
            err_start: err_string(&s.err_start),
            whitebox_errors: err_map(&s.whitebox_errors),
            blackbox_errors: err_map(&s.blackbox_errors),
            logs: &s.logs,
            manifest: &s.manifest,
        }
    }
}

#[derive(Serialize)]
struct BackupJson<'a> {
    description: &'a BackupDescription,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    err_panic: Option<String>,
    component_errors: BTreeMap<String, Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance_list_err: Option<String>,
    instance_snapshots: Vec<SnapshotJson<'a>>,
    #[serde(skip_serializing_if = "no_files")]
    manifest: &'a [String],
}

impl ExportReport for Snapshot {
    fn slug(&self) -> &str {
        &self.instance.slug
    }

    fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn report_plain(&self, w: &mut dyn Write) -> io::Result<()> {
        let slug = &self.instance.slug;
        writeln!(w, "======= Begin Snapshot Report {slug} =======")?;
        writeln!(w, "Slug:  {slug}")?;
        writeln!(w, "Dest:  {}", self.description.dest.display())?;
        writeln!(w, "Start: {}", self.start_time)?;
        writeln!(w, "End:   {}", self.end_time)?;
        writeln!(w)?;

        writeln!(w, "======= Description =======")?;
        write_json(w, &self.description)?;
        writeln!(w)?;

        writeln!(w, "======= Instance =======")?;
        write_json(w, &self.instance)?;
        writeln!(w)?;

        writeln!(w, "======= Errors =======")?;
        writeln!(w, "Panic: {}", display(&self.err_panic))?;
        writeln!(w, "Stop:  {}", display(&self.err_stop))?;
        writeln!(w, "Start: {}", display(&self.err_start))?;
        write_errors(w, "Whitebox", &self.whitebox_errors)?;
        write_errors(w, "Blackbox", &self.blackbox_errors)?;
        writeln!(w)?;

        writeln!(w, "======= Manifest =======")?;
        for file in &self.manifest {
            writeln!(w, "{file}")?;
        }
        writeln!(w)?;

        writeln!(w, "======= End Snapshot Report {slug} =======")
    }

    fn report_machine(&self, w: &mut dyn Write) -> crate::Result<()> {
        serde_json::to_writer(&mut *w, &SnapshotJson::from(self))?;
        Ok(())
    }
}

impl ExportReport for Backup {
    fn slug(&self) -> &str {
        ""
    }

    fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn report_plain(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "======= Backup =======")?;
        writeln!(w, "Dest:  {}", self.description.dest.display())?;
        writeln!(w, "Start: {}", self.start_time)?;
        writeln!(w, "End:   {}", self.end_time)?;
        writeln!(w)?;

        writeln!(w, "======= Description =======")?;
        write_json(w, &self.description)?;
        writeln!(w)?;

        writeln!(w, "======= Errors =======")?;
        writeln!(w, "Panic:           {}", display(&self.err_panic))?;
        writeln!(w, "InstanceListErr: {}", display(&self.instance_list_err))?;
        write_errors(w, "Component Errors", &self.component_errors)?;
        writeln!(w)?;

        writeln!(w, "======= Snapshots =======")?;
        for snapshot in &self.instance_snapshots {
            snapshot.report_plain(w)?;
            writeln!(w)?;
        }

        writeln!(w, "======= Manifest =======")?;
        for file in &self.manifest {
            writeln!(w, "{file}")?;
        }
        writeln!(w)
    }

    fn report_machine(&self, w: &mut dyn Write) -> crate::Result<()> {
        let json = BackupJson {
            description: &self.description,
            start_time: self.start_time,
            end_time: self.end_time,
            err_panic: err_string(&self.err_panic),
            component_errors: err_map(&self.component_errors),
            instance_list_err: err_string(&self.instance_list_err),
            instance_snapshots: self.instance_snapshots.iter().map(SnapshotJson::from).collect(),
            manifest: &self.manifest,
        };
        serde_json::to_writer(&mut *w, &json)?;
        Ok(())
    }
}
