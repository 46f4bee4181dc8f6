// Document field extraction from photographs

use clap::Parser;
use docextract::{
    models::{DocumentExtractionOutcome, DocumentType, FieldTemplate, PipelineConfig},
    processing::{ImageProcessor, TesseractRecognizer},
    DocumentExtractor,
};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "docextract", version, about = "Extract fields from a photographed document")]
struct Args {
    /// Photograph of the document (JPEG, PNG, ...)
    image: PathBuf,

    /// driving_licence or vehicle_registration
    #[arg(short = 't', long, default_value = "driving_licence")]
    document_type: DocumentType,

    /// Field template JSON replacing the built-in one
    #[arg(long)]
    template: Option<PathBuf>,

    /// Pipeline configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write intermediate images here
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    #[arg(short, long, default_value = "eng")]
    language: String,

    /// Tesseract data directory (defaults to TESSDATA_PREFIX)
    #[arg(long)]
    tessdata: Option<String>,

    /// Write the template with learned font profiles to this path
    #[arg(long)]
    save_template: Option<PathBuf>,

    /// Pretty-print the JSON outcome
    #[arg(long)]
    pretty: bool,

    /// Print a readable report instead of JSON
    #[arg(long, conflicts_with = "pretty")]
    report: bool,
}

fn print_report(outcome: &DocumentExtractionOutcome) {
    println!("\n===============================================");
    println!("      DOCUMENT EXTRACTION REPORT");
    println!("===============================================\n");

    println!("  Invocation: {}", outcome.invocation_id);
    println!("  Document Type: {}", outcome.document_type);
    println!("  Result: {}", if outcome.success { "EXTRACTED" } else { "FAILED" });

    if let Some(err) = &outcome.error {
        println!("  Error: {}", err);
        return;
    }

    println!("  Confidence: {:.2}", outcome.confidence);
    println!("  Rotation: {}°", outcome.rotation_used);

    println!("\nFIELDS:");
    for (field, value) in &outcome.extracted_fields {
        println!("  {:<24} {}", field, value);
    }

    if !outcome.images.is_empty() {
        println!("\nIMAGES:");
        for (field, data) in &outcome.images {
            println!("  {:<24} {} bytes (base64)", field, data.len());
        }
    }

    if !outcome.debug_urls.is_empty() {
        println!("\nDEBUG ARTIFACTS:");
        for url in &outcome.debug_urls {
            println!("  {}", url);
        }
    }
}

fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &args.debug_dir {
        config = config.with_debug_dir(dir.clone());
    }

    let template = args
        .template
        .as_ref()
        .map(FieldTemplate::from_path)
        .transpose()?;

    let recognizer = TesseractRecognizer::new(args.tessdata.clone(), &args.language);
    let extractor = DocumentExtractor::new(config, Arc::new(recognizer));

    info!("Reading {}", args.image.display());
    let bytes = ImageProcessor::load_path(&args.image)?;
    let outcome = extractor.extract(&bytes, args.document_type, template.as_ref());

    if args.report {
        print_report(&outcome);
    } else {
        let rendered = if args.pretty {
            serde_json::to_string_pretty(&outcome)?
        } else {
            serde_json::to_string(&outcome)?
        };
        println!("{}", rendered);
    }

    if let Some(path) = &args.save_template {
        let mut learned = match template {
            Some(template) => template,
            None => FieldTemplate::default_for(args.document_type)?,
        };
        let applied = extractor
            .profile_cache()
            .apply_to(args.document_type, &mut learned);
        std::fs::write(path, learned.to_json_pretty()?)?;
        info!("Saved template with {} learned profiles to {}", applied, path.display());
    }

    Ok(outcome.success)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            error!("{}", err);
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
