use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "godata", about = "Humanitarian data collector")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable the progress display (useful when piping logs).
    #[arg(long, global = true)]
    pub quiet: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CollectArgs {
    /// Where the combined JSON document is written.
    #[arg(long)]
    pub output_file: PathBuf,

    /// Also export the per-country data as CSV.
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Test run: only a few countries are collected.
    #[arg(long, default_value_t = false)]
    pub test: bool,

    /// Serve bulk pulls from the local cache when possible.
    #[arg(long, default_value_t = false)]
    pub use_cache: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DocumentsArgs {
    /// Cache directory override for downloaded documents.
    #[arg(long)]
    pub cache_dir: Option<String>,

    /// Only list the feed documents, skip the bulk download.
    #[arg(long, default_value_t = false)]
    pub list_only: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull every data source and write the combined document.
    Collect(CollectArgs),
    /// Download the disaster-report documents from the appeal feeds.
    Documents(DocumentsArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_args_parse() {
        let args = Args::try_parse_from([
            "godata",
            "collect",
            "--output-file",
            "output/output.json",
            "--test",
        ])
        .unwrap();
        let Commands::Collect(collect) = args.command else {
            panic!("expected collect");
        };
        assert_eq!(collect.output_file, PathBuf::from("output/output.json"));
        assert!(collect.test);
        assert!(!collect.use_cache);
        assert!(collect.csv.is_none());
    }

    #[test]
    fn documents_args_parse_with_global_quiet() {
        let args =
            Args::try_parse_from(["godata", "documents", "--list-only", "--quiet"]).unwrap();
        assert!(args.quiet);
        let Commands::Documents(documents) = args.command else {
            panic!("expected documents");
        };
        assert!(documents.list_only);
        assert!(documents.cache_dir.is_none());
    }
}
