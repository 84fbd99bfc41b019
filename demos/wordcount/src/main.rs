use anyhow::{Context, Result};
use clap::Parser;
use regex::Regex;
use sigrid::{Config, Emitter, MapReduce, ValueGroup};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Input files or directories (walked recursively)
    #[arg(required = true)]
    inputs: Vec<String>,
    /// Output directory, one part-NNNNN.tsv per reducer
    #[arg(long)]
    output: String,
    /// Requested mapper count (the engine runs one mapper per input file)
    #[arg(long, default_value_t = 1)]
    mappers: usize,
    /// Number of reducers, i.e. partitions
    #[arg(long, default_value_t = 4)]
    reducers: usize,
    /// Print run statistics as JSON on stdout
    #[arg(long)]
    stats: bool,
}

fn list_files_recursive(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(path.as_ref()) {
        let entry = entry.with_context(|| format!("walk {}", path.as_ref().display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn open_writer(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent).with_context(|| format!("create_dir_all {}", parent.display()))?;
    }
    let file = File::create(path.as_ref()).with_context(|| format!("create {}", path.as_ref().display()))?;
    Ok(BufWriter::new(file))
}

struct WordcountMapper {
    word_re: Regex,
}

impl WordcountMapper {
    fn new() -> Result<Self> {
        Ok(Self { word_re: Regex::new(r"[A-Za-z0-9_']+")? })
    }

    fn map_text(&self, text: &str, emitter: &Emitter<'_>) {
        for cap in self.word_re.find_iter(text) {
            emitter.emit(&cap.as_str().to_lowercase(), "1");
        }
    }
}

impl sigrid::Mapper for WordcountMapper {
    fn map(&self, filename: &str, emitter: &Emitter<'_>) {
        match fs::read_to_string(filename) {
            Ok(text) => self.map_text(&text, emitter),
            Err(e) => error!("read {}: {}", filename, e),
        }
    }
}

/// Each reducer thread owns exactly one writer, so the locks never contend.
struct WordcountReducer {
    writers: Vec<Mutex<BufWriter<File>>>,
}

impl WordcountReducer {
    fn create(output_dir: &str, partitions: usize) -> Result<Self> {
        let writers = (0..partitions)
            .map(|r| open_writer(format!("{}/part-{:05}.tsv", output_dir, r)).map(Mutex::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { writers })
    }

    fn finish(self) -> Result<()> {
        for writer in self.writers {
            let mut w = writer.into_inner().map_err(|_| anyhow::anyhow!("output writer poisoned"))?;
            w.flush().context("flush output")?;
        }
        Ok(())
    }
}

impl sigrid::Reducer for WordcountReducer {
    fn reduce(&self, key: &str, values: &mut ValueGroup<'_, '_>, partition: usize) {
        let count = values.count();
        let mut writer = match self.writers[partition].lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(writer, "{}\t{}", key, count) {
            error!("write reduce tsv line: {}", e);
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut files = Vec::new();
    for input in &args.inputs {
        files.extend(list_files_recursive(input)?);
    }
    let files: Vec<String> = files.into_iter().map(|p| p.to_string_lossy().into_owned()).collect();
    info!(files = files.len(), reducers = args.reducers, output = %args.output, "wordcount starting");

    let config = Config::from_env()?;
    let reducer = WordcountReducer::create(&args.output, args.reducers)?;
    let job = MapReduce::new(WordcountMapper::new()?, reducer)
        .inputs(files)
        .num_mappers(args.mappers)
        .num_reducers(args.reducers)
        .config(config);
    let stats = job.run().context("wordcount run failed")?;
    job.into_reducer().finish()?;

    if args.stats {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn read_parts(dir: &Path) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for path in list_files_recursive(dir).unwrap() {
            for line in fs::read_to_string(&path).unwrap().lines() {
                let (word, count) = line.split_once('\t').unwrap();
                assert!(counts.insert(word.to_string(), count.parse().unwrap()).is_none(), "{word} written twice");
            }
        }
        counts
    }

    #[test]
    fn counts_words_across_files() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("a.txt"), "The cat and the dog.\nA cat!").unwrap();
        fs::create_dir(input.path().join("nested")).unwrap();
        fs::write(input.path().join("nested/b.txt"), "dog's day, the end").unwrap();

        let files: Vec<String> = list_files_recursive(input.path())
            .unwrap()
            .into_iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 2);

        let out_dir = output.path().to_string_lossy().into_owned();
        let job = MapReduce::new(WordcountMapper::new().unwrap(), WordcountReducer::create(&out_dir, 3).unwrap())
            .inputs(files)
            .num_reducers(3);
        let stats = job.run().unwrap();
        job.into_reducer().finish().unwrap();

        assert_eq!(stats.map.total_emits, 11);
        let counts = read_parts(output.path());
        assert_eq!(counts["the"], 3);
        assert_eq!(counts["cat"], 2);
        assert_eq!(counts["dog"], 1);
        assert_eq!(counts["dog's"], 1);
        assert_eq!(counts["a"], 1);
        assert_eq!(counts.len(), 8);
    }

    #[test]
    fn unreadable_input_contributes_nothing() {
        let output = tempfile::tempdir().unwrap();
        let out_dir = output.path().to_string_lossy().into_owned();
        let job = MapReduce::new(WordcountMapper::new().unwrap(), WordcountReducer::create(&out_dir, 2).unwrap())
            .add_input("/definitely/not/here.txt")
            .num_reducers(2);
        let stats = job.run().unwrap();
        job.into_reducer().finish().unwrap();
        assert_eq!(stats.map.total_emits, 0);
        assert!(read_parts(output.path()).is_empty());
    }
}
