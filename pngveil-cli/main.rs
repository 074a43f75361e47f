use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use glob::glob;
use log::{error, info, LevelFilter};
use pngveil::{
    embed_payload, embed_png, DecoderConfig, Logger, PngInfo, PngVeil, UnknownFilterPolicy, MAX_HEIGHT,
    MAX_NESTING_DEPTH, MAX_WIDTH,
};
use render::RenderOptions;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(name = "pngveil", version, about = "Decode PNG files and recover what hides after IEND")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, default_value_t = MAX_WIDTH, help = "Largest accepted image width")]
    max_width: u32,

    #[arg(long, global = true, default_value_t = MAX_HEIGHT, help = "Largest accepted image height")]
    max_height: u32,

    #[arg(long, global = true, help = "Fail on chunks whose CRC does not match")]
    verify_crc: bool,

    #[arg(long, global = true, help = "Repeat the previous row instead of failing on unknown filter types")]
    lenient_filters: bool,

    #[arg(short, long, global = true, action = ArgAction::Count, help = "More logging, repeat for debug output")]
    verbose: u8,

    #[arg(short, long, global = true, help = "Only log errors")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the chunk list, header, metadata flags and payload summary
    Info {
        #[arg(required = true)]
        path: String,

        #[arg(long, help = "Print as JSON")]
        json: bool,
    },

    /// Decode and render to PNG, applying the effects the metadata asks for
    Decode {
        #[arg(required = true)]
        path: String,

        #[arg(short = 'o', long = "output-dir", help = "Output directory for rendered files")]
        output_dir: Option<String>,

        #[arg(long, help = "Ignore blur and grayscale requests from metadata")]
        no_effects: bool,

        #[arg(long, help = "Do not upscale small images")]
        no_upscale: bool,
    },

    /// Write every payload found after IEND, following nested PNGs
    Extract {
        #[arg(required = true)]
        path: String,

        #[arg(short = 'o', long = "output-dir", help = "Output directory for payload files")]
        output_dir: Option<String>,

        #[arg(long, default_value_t = MAX_NESTING_DEPTH, help = "How many nested payloads to unwrap")]
        depth: usize,
    },

    /// Append a file after the IEND chunk of a container PNG
    Embed {
        container: PathBuf,

        hidden: PathBuf,

        #[arg(short = 'o', long = "output")]
        output: PathBuf,

        #[arg(long, help = "Refuse payloads that are not PNG files")]
        require_png: bool,
    },
}

impl Cli {
    fn level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }

        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }

    fn config(&self) -> DecoderConfig {
        let policy = if self.lenient_filters {
            UnknownFilterPolicy::CarryForward
        } else {
            UnknownFilterPolicy::Fail
        };

        DecoderConfig::default()
            .with_limits(self.max_width, self.max_height)
            .with_unknown_filter(policy)
            .with_crc_verification(self.verify_crc)
    }
}

fn get_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let absolute_pattern = if Path::new(pattern).is_relative() {
        base_dir.join(pattern).to_string_lossy().into_owned()
    } else {
        pattern.to_string()
    };

    let mut files = Vec::new();
    for entry in glob(&absolute_pattern).context("Failed to read glob pattern")? {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => error!("{}", e),
        }
    }

    Ok(files)
}

fn get_output_path(file: &Path, output_dir: Option<&str>, suffix: &str) -> Result<PathBuf> {
    let file_stem = file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .context("Invalid file name")?;

    let dir = match output_dir {
        Some(dir) => {
            let dir = Path::new(dir);
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
            dir.to_path_buf()
        }
        // Next to the input file
        None => file.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
    };

    Ok(dir.join(format!("{}_{}", file_stem, suffix)))
}

fn print_info(file: &Path, info: &PngInfo) {
    println!("File: {}", file.display());
    println!(
        "  {}x{}, {:?}, {} bits, {} IDAT chunks ({} bytes compressed)",
        info.width, info.height, info.color_type, info.bit_depth, info.idat_chunks, info.compressed_size
    );

    if let Some(palette) = &info.palette {
        println!("  Palette: {} entries", palette.len());
    }

    for chunk in &info.chunks {
        println!(
            "  #{:<3} {} {:>10} bytes at {:<10} crc 0x{:08x}",
            chunk.index, chunk.kind, chunk.length, chunk.offset, chunk.crc
        );
    }

    for text in &info.text_chunks {
        println!("  Text {:?}: {:?}", text.keyword(), text.text());
    }

    println!(
        "  Blur: {}, grayscale with alpha: {}",
        info.flags.should_blur(),
        info.flags.should_grayscale_with_alpha()
    );

    match (info.payload.length, info.payload.is_png) {
        (0, _) => println!("  No hidden payload"),
        (length, true) => println!("  Hidden payload: {} bytes, nested PNG", length),
        (length, false) => println!("  Hidden payload: {} bytes", length),
    }
}

fn run_info(file: &Path, config: DecoderConfig, json: bool) -> Result<()> {
    let info = PngVeil::open(file)?.with_config(config).get_info()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print_info(file, &info);
    }

    Ok(())
}

fn run_decode(file: &Path, config: DecoderConfig, output_dir: Option<&str>, options: &RenderOptions) -> Result<()> {
    let decoded = PngVeil::open(file)?.with_config(config).decode()?;
    let image = render::render(&decoded, options)?;

    let output_path = get_output_path(file, output_dir, "decoded.png")?;
    println!("Writing to: {}", output_path.display());
    render::save(&image, &output_path)?;

    Ok(())
}

fn run_extract(file: &Path, config: DecoderConfig, output_dir: Option<&str>) -> Result<()> {
    let parsed = PngVeil::open(file)?.with_config(config).parse()?;
    let chain = parsed.payload_chain();

    if chain.is_empty() {
        println!("{}: no hidden payload", file.display());
        return Ok(());
    }

    for (n, payload) in chain.iter().enumerate() {
        let extension = if payload.is_png() { "png" } else { "bin" };
        let output_path = get_output_path(file, output_dir, &format!("payload_{}.{}", n + 1, extension))?;

        println!("Writing {} bytes to: {}", payload.len(), output_path.display());
        fs::write(&output_path, payload.bytes())
            .with_context(|| format!("Failed to write {}", output_path.display()))?;

        if let Some(text) = payload.as_text() {
            println!("{}", text);
        }
    }

    Ok(())
}

fn run_embed(container: &Path, hidden: &Path, output: &Path, require_png: bool) -> Result<()> {
    let container_bytes = fs::read(container).with_context(|| format!("Failed to read {}", container.display()))?;
    let hidden_bytes = fs::read(hidden).with_context(|| format!("Failed to read {}", hidden.display()))?;

    let combined = if require_png {
        embed_png(&container_bytes, &hidden_bytes)
    } else {
        embed_payload(&container_bytes, &hidden_bytes)
    }
    .with_context(|| format!("Cannot embed {} into {}", hidden.display(), container.display()))?;

    fs::write(output, &combined).with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Wrote {} bytes to {}", combined.len(), output.display());

    Ok(())
}

fn for_each_file(pattern: &str, mut process: impl FnMut(&Path) -> Result<()>) -> Result<()> {
    let files = get_files(pattern)?;

    if files.is_empty() {
        bail!("No files found matching pattern: {}", pattern);
    }

    for file in files {
        if let Err(err) = process(&file) {
            error!("Error processing {}: {:#}", file.display(), err);
            continue;
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    Logger::init(cli.level())?;

    let config = cli.config();

    match &cli.command {
        Command::Info { path, json } => for_each_file(path, |file| run_info(file, config, *json)),
        Command::Decode {
            path,
            output_dir,
            no_effects,
            no_upscale,
        } => {
            let options = RenderOptions {
                effects: !no_effects,
                upscale: !no_upscale,
                ..Default::default()
            };

            for_each_file(path, |file| run_decode(file, config, output_dir.as_deref(), &options))
        }
        Command::Extract { path, output_dir, depth } => {
            let config = config.with_max_nesting_depth(*depth);
            for_each_file(path, |file| run_extract(file, config, output_dir.as_deref()))
        }
        Command::Embed {
            container,
            hidden,
            output,
            require_png,
        } => run_embed(container, hidden, output, *require_png),
    }
}
