//! Merge command handler

use crate::commands::MergeArgs;
use crate::error::CliResult;
use covweave::{CoverageConfig, CoverageLogger, HitMerger, InstrumentationMap, MergedHits};

/// Execute the merge command, returning the merged counts
pub fn execute_merge(
    config: &CoverageConfig,
    args: &MergeArgs,
    logger: &dyn CoverageLogger,
) -> CliResult<MergedHits> {
    let map_path = args.map.as_ref().unwrap_or(&config.map_path);
    let map = InstrumentationMap::load(map_path)?;
    let merger = HitMerger::new(&map).with_logger(logger);

    let merged = if args.files.is_empty() {
        let hits_dir = args.hits.as_ref().unwrap_or(&config.hits_dir);
        merger.merge_dir(hits_dir, args.run_id.as_deref())?
    } else {
        merger.merge_files(&args.files)?
    };

    let json = serde_json::to_string_pretty(&merged).map_err(covweave::CovError::from)?;
    match &args.output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(merged)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use covweave::tracker::hit_file_name;
    use covweave::{HitFile, MethodId, MethodRecord, ModuleMap, NullLogger, PointId, PointKind, PointRecord, SourceSpan};
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> CoverageConfig {
        let map_path = dir.path().join("map.json");
        let module = ModuleMap::new(
            "App",
            vec![PointRecord {
                id: PointId::new(0),
                kind: PointKind::Line,
                method: MethodId::new(0),
                span: SourceSpan::line("a.cs", 1),
            }],
            vec![MethodRecord {
                id: MethodId::new(0),
                type_name: "App.Program".into(),
                name: "Main".into(),
                parent: None,
                file: "a.cs".into(),
                first_line: 1,
                last_line: 1,
            }],
            Vec::new(),
        );
        let fingerprint = module.fingerprint.clone();
        let mut map = InstrumentationMap::new();
        map.insert(module);
        map.save(&map_path).unwrap();

        let hits = dir.path().join("hits");
        for (instance, count) in [(0, 3u64), (1, 2)] {
            HitFile::new("App", "r1", fingerprint.clone(), [(PointId::new(0), count)].into_iter().collect())
                .write(&hits.join(hit_file_name("App", "r1", 1, instance)))
                .unwrap();
        }
        CoverageConfig::builder().map_path(map_path).hits_dir(hits).build()
    }

    #[test]
    fn test_merge_directory_to_file() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        let out = dir.path().join("merged.json");
        let args = MergeArgs {
            map: None,
            hits: None,
            run_id: Some("r1".into()),
            files: Vec::new(),
            output: Some(out.clone()),
        };
        let merged = execute_merge(&config, &args, &NullLogger).unwrap();
        assert_eq!(merged.count("App", PointId::new(0)), 5);
        let written: MergedHits = serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(written, merged);
    }

    #[test]
    fn test_missing_map_is_error() {
        let dir = TempDir::new().unwrap();
        let config = CoverageConfig::builder().map_path(dir.path().join("none.json")).build();
        let args = MergeArgs {
            map: None,
            hits: None,
            run_id: None,
            files: Vec::new(),
            output: None,
        };
        assert!(execute_merge(&config, &args, &NullLogger).is_err());
    }
}
