use std::io::BufReader;
use std::path::Path;

use clap::Parser;
use log::{error, info};
use soulfu_lib::ddd::Ddd;
use soulfu_model::{DddError, DddModel, obj};
use thiserror::Error;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// The model file to convert.
    /// .ddd/.DDD files decode to model<i>.OBJ in the current directory,
    /// .obj/.OBJ files encode to a .DDD next to them.
    path: String,
}

// Exit codes 1..=5. clap exits with 2 on its own for argument errors.
#[derive(Debug, Error)]
enum ConvertError {
    #[error("{0} is not a .ddd or .obj file, nothing to do")]
    NoOperation(String),

    #[error("failed to read {0}")]
    Input(String, #[source] std::io::Error),

    #[error("failed to write {0}")]
    Output(String, #[source] std::io::Error),

    #[error(transparent)]
    Format(DddError),
}

impl ConvertError {
    fn exit_code(&self) -> i32 {
        match self {
            ConvertError::NoOperation(_) => 1,
            ConvertError::Input(..) => 3,
            ConvertError::Output(..) => 4,
            ConvertError::Format(_) => 5,
        }
    }
}

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        error!("{e}");
        let mut source = std::error::Error::source(&e);
        while let Some(inner) = source {
            error!("caused by: {inner}");
            source = inner.source();
        }
        std::process::exit(e.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), ConvertError> {
    let path = &cli.path;
    if path.ends_with(".ddd") || path.ends_with(".DDD") {
        decode(path)
    } else if path.ends_with(".obj") || path.ends_with(".OBJ") {
        encode(path)
    } else {
        Err(ConvertError::NoOperation(path.clone()))
    }
}

fn decode(path: &str) -> Result<(), ConvertError> {
    let bytes = std::fs::read(path).map_err(|e| ConvertError::Input(path.to_string(), e))?;
    let ddd = Ddd::from_bytes(bytes).map_err(|e| ConvertError::Format(e.into()))?;
    let model = DddModel::from_ddd(&ddd);

    info!("{} base models, {} bone frames", model.base_models.len(), model.bone_frames.len());
    if let Some(name) = &model.external_bone_frame_file {
        info!("bone frames are external in {name}");
    }
    for (i, base_model) in model.base_models.iter().enumerate() {
        info!(
            "base model {i}: {} vertices, {} texture vertices, {} joints, {} bones",
            base_model.vertices.len(),
            base_model.texture_vertices.len(),
            base_model.joints.len(),
            base_model.bones.len()
        );
    }

    let source_name = file_name(path);
    obj::write_objs(&model, Path::new("."), &source_name).map_err(|e| match e {
        DddError::Io(io) => ConvertError::Output("OBJ output".to_string(), io),
        other => ConvertError::Format(other),
    })?;
    Ok(())
}

fn encode(path: &str) -> Result<(), ConvertError> {
    let input =
        std::fs::File::open(path).map_err(|e| ConvertError::Input(path.to_string(), e))?;
    let mesh = obj::import_obj(BufReader::new(input)).map_err(|e| match e {
        DddError::Io(io) => ConvertError::Input(path.to_string(), io),
        other => ConvertError::Format(other),
    })?;
    let ddd = mesh.to_ddd().map_err(ConvertError::Format)?;

    let output = output_name(path);
    info!("writing {output}");
    ddd.save(&output).map_err(|e| match e {
        binrw::Error::Io(io) => ConvertError::Output(output.clone(), io),
        other => ConvertError::Format(other.into()),
    })?;
    Ok(())
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Replace the 3 character extension with DDD and strip any directory.
fn output_name(path: &str) -> String {
    let name = file_name(path);
    format!("{}DDD", &name[..name.len() - 3])
}
