use crate::engine::DEFAULT_NUM_PROBES;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about, bin_name = "verscout")]
pub struct Arguments {
    /// Base URL of the target installation
    pub url: Option<String>,
    /// Web app to fingerprint. Use "guess" to discover which supported apps
    /// are installed, or "scan" to guess and fingerprint everything
    pub app_name: Option<String>,
    /// Fingerprint the version of a plugin of the given app; "guess"
    /// discovers which supported plugins are installed
    #[arg(long, short)]
    pub plugin_name: Option<String>,
    /// Skip fingerprinting the app itself, just handle the plugin
    #[arg(long, short)]
    pub skip: bool,
    /// Number of files to fetch (more may increase accuracy)
    #[arg(long, short, default_value_t = DEFAULT_NUM_PROBES)]
    pub num_probes: usize,
    /// If more than one version survives, use winnowing to narrow it down
    /// (up to num-probes additional requests)
    #[arg(long, short)]
    pub winnow: bool,
    /// List supported web apps and their plugin databases
    #[arg(long, short)]
    pub list: bool,
    /// Build the fingerprint database for the named app (or its plugin with
    /// -p) from a directory of unpacked release trees
    #[arg(long, short, value_name = "BASEPATH")]
    pub build_db: Option<String>,
    /// Write the scan results to this file (.json for JSON, anything else
    /// for plain text)
    #[arg(long, short)]
    pub result: Option<String>,
    /// Path to an app configuration file (JSON); defaults to the built-in table
    #[arg(long, short)]
    pub config: Option<String>,
    #[arg(long, short)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let args = Arguments::parse_from(["verscout"]);
        assert!(args.url.is_none());
        assert!(args.app_name.is_none());
        assert!(args.plugin_name.is_none());
        assert!(!args.skip);
        assert_eq!(args.num_probes, 15);
        assert!(!args.winnow);
        assert!(!args.list);
        assert!(!args.verbose);
    }

    #[test]
    fn test_parse_positionals() {
        let args = Arguments::parse_from(["verscout", "http://example.com", "wordpress"]);
        assert_eq!(args.url.as_deref(), Some("http://example.com"));
        assert_eq!(args.app_name.as_deref(), Some("wordpress"));
    }

    #[test]
    fn test_parse_plugin_name() {
        let args = Arguments::parse_from(["verscout", "-p", "akismet", "http://x", "wordpress"]);
        assert_eq!(args.plugin_name.as_deref(), Some("akismet"));
    }

    #[test]
    fn test_parse_num_probes() {
        let args = Arguments::parse_from(["verscout", "-n", "30", "http://x", "joomla"]);
        assert_eq!(args.num_probes, 30);
    }

    #[test]
    fn test_parse_flags() {
        let args = Arguments::parse_from(["verscout", "-s", "-w", "-v", "http://x", "joomla"]);
        assert!(args.skip);
        assert!(args.winnow);
        assert!(args.verbose);
    }

    #[test]
    fn test_parse_list_without_positionals() {
        let args = Arguments::parse_from(["verscout", "--list"]);
        assert!(args.list);
        assert!(args.url.is_none());
    }

    #[test]
    fn test_parse_build_db() {
        let args = Arguments::parse_from(["verscout", "--build-db", "./releases", "wordpress"]);
        assert_eq!(args.build_db.as_deref(), Some("./releases"));
        // the sole positional lands in the url slot; main reads it as the app
        assert_eq!(args.url.as_deref(), Some("wordpress"));
    }

    #[test]
    fn test_parse_long_flags() {
        let args = Arguments::parse_from([
            "verscout",
            "--plugin-name",
            "guess",
            "--num-probes",
            "20",
            "--winnow",
            "--result",
            "out.json",
            "http://example.com",
            "joomla",
        ]);
        assert_eq!(args.plugin_name.as_deref(), Some("guess"));
        assert_eq!(args.num_probes, 20);
        assert!(args.winnow);
        assert_eq!(args.result.as_deref(), Some("out.json"));
    }
}
