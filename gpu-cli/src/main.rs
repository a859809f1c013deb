//! `dis`/`validate`/`convert` subcommands over GCN microcode and SPIR-V-shaped blobs:
//! a small offline front end to the `gcn-ir`/`gcn-shader` translation pipeline for
//! inspecting shaders outside of a running device façade.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use gcn_shader::front::gcn::decode_program;
use gpu_types::{Environment, InterpolationModes, PrimitiveType, PsInputVgprs, Stage};

#[derive(Parser)]
#[command(name = "gpu-cli", about = "GCN/SPIR-V inspection front end", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Disassemble a SPIR-V-shaped word stream to text.
    Dis {
        /// Path to a flat little-endian u32 word stream.
        input: PathBuf,
        /// Prefix each line with its arena handle index.
        #[arg(long)]
        show_ids: bool,
    },
    /// Validate a SPIR-V-shaped word stream, printing and exiting nonzero on failure.
    Validate {
        input: PathBuf,
    },
    /// Decode a GCN program and translate it to SPIR-V, printing the disassembly.
    Convert {
        /// Path to a flat little-endian u32 GCN instruction stream.
        input: PathBuf,
        /// Word offset of the program entry point.
        #[arg(long, default_value_t = 0)]
        entry: usize,
        #[arg(long, value_enum, default_value_t = CliStage::Vertex)]
        stage: CliStage,
        /// Disassemble the resulting SPIR-V instead of writing it as raw words.
        #[arg(long)]
        dis: bool,
        /// Where to write the SPIR-V word stream (defaults to stdout as text when
        /// `--dis` is set, otherwise required).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CliStage {
    Compute,
    Vertex,
    Geometry,
    Fragment,
    TessControl,
    TessEvaluation,
}

impl From<CliStage> for Stage {
    fn from(s: CliStage) -> Stage {
        match s {
            CliStage::Compute => Stage::Compute,
            CliStage::Vertex => Stage::Vertex,
            CliStage::Geometry => Stage::Geometry,
            CliStage::Fragment => Stage::Fragment,
            CliStage::TessControl => Stage::TessControl,
            CliStage::TessEvaluation => Stage::TessEvaluation,
        }
    }
}

/// A `gcn_shader::convert::GuestMemory` view over a flat little-endian word buffer,
/// standing in for the VM-id-windowed mapping a real device façade provides.
struct FlatMemory(Vec<u32>);

impl gcn_shader::convert::GuestMemory for FlatMemory {
    fn read_u32(&self, address: u64) -> Option<u32> {
        let index = (address / 4) as usize;
        self.0.get(index).copied()
    }
}

fn read_words(path: &Path) -> Result<Vec<u32>> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if bytes.len() % 4 != 0 {
        bail!("{}: byte length {} is not a multiple of 4", path.display(), bytes.len());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn write_words(path: &Path, words: &[u32]) -> Result<()> {
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for w in words {
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

fn default_environment() -> Environment {
    Environment {
        user_sgprs: Default::default(),
        primitive_type: PrimitiveType::TriangleList,
        ps_input_vgprs: PsInputVgprs::default(),
        viewport_count: 1,
        interpolation: InterpolationModes::default(),
        dependent: None,
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Dis { input, show_ids } => {
            let words = read_words(&input)?;
            print!("{}", gcn_ir::disassemble(&words, show_ids));
        }
        Command::Validate { input } => {
            let words = read_words(&input)?;
            if gcn_ir::validate(&words) {
                println!("valid");
            } else {
                println!("invalid");
                std::process::exit(1);
            }
        }
        Command::Convert { input, entry, stage, dis, output } => {
            let words = read_words(&input)?;
            let blocks = decode_program(&words, entry)
                .with_context(|| format!("decoding GCN program at word {entry}"))?;
            let environment = default_environment();
            let memory = FlatMemory(words.clone());
            let shader = gcn_shader::convert::convert(
                &blocks,
                stage.into(),
                &environment,
                &environment.user_sgprs,
                &memory,
            )
            .context("translating GCN program to SPIR-V")?;

            log::info!("resolved {} uniform bindings", shader.uniforms.len());

            if dis {
                let text = gcn_ir::disassemble(&shader.spirv, false);
                match output {
                    Some(path) => fs::write(&path, text)
                        .with_context(|| format!("writing {}", path.display()))?,
                    None => print!("{text}"),
                }
            } else {
                let Some(path) = output else {
                    bail!("--output is required unless --dis is set");
                };
                write_words(&path, &shader.spirv)?;
            }
        }
    }

    Ok(())
}
