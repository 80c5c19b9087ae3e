//! Rigport - COLLADA to runtime mesh and skeleton importer
//!
//! Imports one document, prints what came out of it and optionally writes
//! the full result as JSON.

mod settings;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rigport_core::UpAxis;
use rigport_import::{
    import_file, merge_all, Diagnostic, DiagnosticSink, ImportOutput, MeshData, TracingSink,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use settings::Overrides;

#[derive(Parser, Debug)]
#[command(name = "rigport")]
#[command(about = "Import COLLADA meshes and skeletons into runtime-ready buffers")]
struct Cli {
    /// Path to a .dae file
    input: PathBuf,

    /// TOML file with import settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the document's up axis (X_UP, Y_UP or Z_UP)
    #[arg(long)]
    up_axis: Option<UpAxis>,

    /// Reverse triangle winding
    #[arg(long)]
    flip_faces: bool,

    /// Skip geometry extraction
    #[arg(long)]
    no_meshes: bool,

    /// Skip skeleton extraction
    #[arg(long)]
    no_skeletons: bool,

    /// Merge all imported meshes into one
    #[arg(long)]
    merge: bool,

    /// Write the imported data as JSON to this file
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write the effective settings to this TOML file
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "rigport_import=trace"
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Logs every diagnostic and keeps a copy for the summary.
#[derive(Default)]
struct CollectingSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink for CollectingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        TracingSink.report(diagnostic.clone());
        self.diagnostics.push(diagnostic);
    }
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    output: &'a ImportOutput,
    diagnostics: &'a [Diagnostic],
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let overrides = Overrides {
        up_axis: cli.up_axis,
        flip_faces: cli.flip_faces,
        no_meshes: cli.no_meshes,
        no_skeletons: cli.no_skeletons,
    };
    let config = overrides.apply(settings::load(cli.config.as_deref())?);
    if let Some(path) = &cli.save_config {
        settings::save(&config, path)?;
    }

    info!("Importing {}", cli.input.display());
    let mut sink = CollectingSink::default();
    let mut output = import_file(&cli.input, &config, &mut sink)
        .with_context(|| format!("Failed to import {}", cli.input.display()))?;

    if cli.merge && output.meshes.len() > 1 {
        let merged = merge_all(&output.meshes).context("Failed to merge meshes")?;
        output.meshes = merged.into_iter().collect();
    }

    print_summary(&output, &sink.diagnostics);

    if let Some(path) = &cli.json {
        let report = Report {
            output: &output,
            diagnostics: &sink.diagnostics,
        };
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {}", path.display());
    }

    Ok(())
}

fn print_summary(output: &ImportOutput, diagnostics: &[Diagnostic]) {
    println!("{} (up axis {})", output.source_name, output.up_axis);
    for mesh in &output.meshes {
        println!("  mesh {}", describe_mesh(mesh));
    }
    for skeleton in &output.skeletons {
        println!(
            "  skeleton {}: {} bones, root '{}', {} joint names",
            skeleton.name,
            skeleton.bone_count(),
            skeleton.root_bone.name,
            skeleton.bone_names.len()
        );
    }
    if !diagnostics.is_empty() {
        println!("  {} diagnostics:", diagnostics.len());
        for diagnostic in diagnostics {
            println!("    {}", diagnostic);
        }
    }
}

fn describe_mesh(mesh: &MeshData) -> String {
    let skin = if mesh.is_skinned() {
        format!(", skinned to {} joints", mesh.joint_names.len())
    } else {
        String::new()
    };
    format!(
        "{}: {} vertices, {} triangles{}",
        mesh.name,
        mesh.vertex_count(),
        mesh.triangle_count(),
        skin
    )
}
