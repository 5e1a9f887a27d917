//! Index groups for the cysteine sulfur atoms and water oxygens
//!
//! The index tool (`make_ndx`) is driven by a fixed command script:
//!
//! ```text
//! keep 0                  drop every default group but System
//! del 0                   ... and System itself
//! r CYSH & t S            all cysteine sulfur atoms
//! splitres 0              one group per residue, in structure order
//! del 0                   drop the combined group
//! name 0 Cys5             bind labels by position, ascending resid
//! name 1 Cys10
//! t OW                    water oxygens
//! q
//! ```
//!
//! Labels are bound purely by position: the i-th split group (i-th cysteine
//! in the structure) receives the i-th smallest configured resid. When the
//! structure does not list its cysteines in ascending resid order the labels
//! are silently wrong. [`verify_label_order`] exposes that risk for a given
//! structure order without changing the binding itself.

use crate::config::AccessibilityConfig;
use crate::error::IndexError;
use crate::layout::{group_label, WATER_GROUP};
use crate::tools::{ToolCommand, ToolEnvironment};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Residue and atom-type names used by the selection script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionNames {
    /// Residue name of (protonated) cysteines
    #[serde(default = "default_cysteine_resname")]
    pub cysteine_resname: String,
    /// Atom type of the sulfhydryl sulfur
    #[serde(default = "default_sulfur_type")]
    pub sulfur_type: String,
    /// Atom type of water oxygens
    #[serde(default = "default_water_oxygen_type")]
    pub water_oxygen_type: String,
}

fn default_cysteine_resname() -> String {
    "CYSH".to_string()
}

fn default_sulfur_type() -> String {
    "S".to_string()
}

fn default_water_oxygen_type() -> String {
    WATER_GROUP.to_string()
}

impl Default for SelectionNames {
    fn default() -> Self {
        Self {
            cysteine_resname: default_cysteine_resname(),
            sulfur_type: default_sulfur_type(),
            water_oxygen_type: default_water_oxygen_type(),
        }
    }
}

/// Builds the cysteine/water index file with the external index tool.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    make_ndx: ToolCommand,
    selection: SelectionNames,
    resids: Vec<i64>,
}

impl IndexBuilder {
    pub fn new(env: &ToolEnvironment, config: &AccessibilityConfig) -> Self {
        Self {
            make_ndx: env.make_ndx.clone(),
            selection: SelectionNames::default(),
            resids: config.cysteines().to_vec(),
        }
    }

    pub fn with_selection(mut self, selection: SelectionNames) -> Self {
        self.selection = selection;
        self
    }

    /// The selection script, one command per entry.
    pub fn commands(&self) -> Vec<String> {
        let sel = &self.selection;
        let mut commands = vec![
            "keep 0".to_string(),
            "del 0".to_string(),
            format!("r {} & t {}", sel.cysteine_resname, sel.sulfur_type),
            "splitres 0".to_string(),
            "del 0".to_string(),
        ];
        for (group, &resid) in self.resids.iter().enumerate() {
            commands.push(format!("name {} {}", group, group_label(resid)));
        }
        commands.push(format!("t {}", sel.water_oxygen_type));
        commands.push("q".to_string());
        commands
    }

    /// Run the index tool on `structure`, writing (overwriting) `ndx`.
    pub fn build(&self, structure: &Path, ndx: &Path) -> Result<(), IndexError> {
        if let Some(parent) = ndx.parent() {
            fs::create_dir_all(parent).map_err(|source| IndexError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let program = self.make_ndx.to_string();
        log::info!("Building index {} from {}", ndx.display(), structure.display());
        log::debug!("{} -f {} -o {}", program, structure.display(), ndx.display());

        let mut child = self
            .make_ndx
            .command()
            .arg("-f")
            .arg(structure)
            .arg("-o")
            .arg(ndx)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| IndexError::Launch {
                program: program.clone(),
                source,
            })?;

        // Feed the script from a separate thread so a chatty tool cannot
        // block on a full stdout pipe while we are still writing.
        let mut script = self.commands().join("\n");
        script.push('\n');
        let stdin = child.stdin.take();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(script.as_bytes())?;
            }
            Ok(())
        });

        let output = child.wait_with_output().map_err(|source| IndexError::Launch {
            program: program.clone(),
            source,
        })?;
        if let Ok(Err(e)) = writer.join() {
            // The tool may quit before consuming all input; its exit status decides.
            log::debug!("index tool closed stdin early: {}", e);
        }

        log::debug!("index tool stdout:\n{}", String::from_utf8_lossy(&output.stdout));
        if !output.status.success() {
            return Err(IndexError::Exit {
                program,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !ndx.exists() {
            return Err(IndexError::Io {
                path: ndx.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "index tool finished but did not write the index file",
                ),
            });
        }
        Ok(())
    }
}

/// One named group of a `.ndx` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexGroup {
    pub name: String,
    /// 1-based atom numbers
    pub atoms: Vec<usize>,
}

/// Read the groups of a GROMACS index file, in file order.
pub fn read_index_groups(path: &Path) -> Result<Vec<IndexGroup>, IndexError> {
    let content = fs::read_to_string(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_index(&content, path)
}

/// Parse `.ndx` content: `[ name ]` headers followed by atom numbers.
pub fn parse_index(content: &str, path: &Path) -> Result<Vec<IndexGroup>, IndexError> {
    let mut groups: Vec<IndexGroup> = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(header) = trimmed.strip_prefix('[') {
            let name = header.strip_suffix(']').ok_or_else(|| IndexError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                message: format!("unterminated group header '{}'", trimmed),
            })?;
            groups.push(IndexGroup {
                name: name.trim().to_string(),
                atoms: Vec::new(),
            });
            continue;
        }
        let group = groups.last_mut().ok_or_else(|| IndexError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            message: "atom numbers before the first group header".to_string(),
        })?;
        for field in trimmed.split_whitespace() {
            let atom = field.parse::<usize>().map_err(|_| IndexError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                message: format!("invalid atom number '{}'", field),
            })?;
            group.atoms.push(atom);
        }
    }
    Ok(groups)
}

/// Compare the number of cysteine groups in an index with the configuration.
///
/// Every group except the water group counts as a cysteine group. A
/// mismatch is logged as a warning, or returned as an error when `strict`.
pub fn check_group_count(
    groups: &[IndexGroup],
    expected: usize,
    water_group: &str,
    strict: bool,
) -> Result<usize, IndexError> {
    let found = groups.iter().filter(|g| g.name != water_group).count();
    if found != expected {
        if strict {
            return Err(IndexError::GroupCountMismatch { expected, found });
        }
        log::warn!(
            "Index holds {} cysteine groups but {} resids are configured; labels may be misassigned",
            found,
            expected
        );
    }
    Ok(found)
}

/// Require the structure to list exactly as many cysteines as are configured.
///
/// Positional labelling is meaningless otherwise, so unlike
/// [`check_group_count`] this is never permissive.
pub fn check_structure_count(path: &Path, order: &[i64], expected: usize) -> Result<(), IndexError> {
    if order.is_empty() || order.len() != expected {
        return Err(IndexError::StructureCountMismatch {
            path: path.to_path_buf(),
            expected,
            found: order.len(),
        });
    }
    Ok(())
}

/// A label bound by position to a cysteine of the structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelBinding {
    /// Resid of the cysteine as it appears in the structure
    pub structure_resid: i64,
    /// Label it receives, if there are enough configured resids
    pub label: Option<String>,
}

/// A structure cysteine that receives another residue's label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mislabel {
    pub structure_resid: i64,
    pub assigned_label: String,
}

/// Reproduce the positional binding performed by the index script.
///
/// `structure_order` lists the cysteine resids in the order the structure
/// holds them; `configured` is the sorted resid list of the configuration.
pub fn positional_labels(structure_order: &[i64], configured: &[i64]) -> Vec<LabelBinding> {
    structure_order
        .iter()
        .enumerate()
        .map(|(i, &resid)| LabelBinding {
            structure_resid: resid,
            label: configured.get(i).map(|&r| group_label(r)),
        })
        .collect()
}

/// Cysteines whose positional label names a different residue.
pub fn verify_label_order(structure_order: &[i64], configured: &[i64]) -> Vec<Mislabel> {
    positional_labels(structure_order, configured)
        .into_iter()
        .filter_map(|b| match b.label {
            Some(label) if label != group_label(b.structure_resid) => Some(Mislabel {
                structure_resid: b.structure_resid,
                assigned_label: label,
            }),
            _ => None,
        })
        .collect()
}

/// Order of cysteine sulfur atoms in a PDB file, as residue numbers.
///
/// Sulfur atoms are recognised by an atom name starting with `S` (SG). The
/// residue name is read from columns 18-21, where GROMACS writes four-letter
/// names such as `CYSH`.
pub fn cysteine_order_from_pdb(path: &Path, resname: &str) -> Result<Vec<i64>, IndexError> {
    let content = read_structure(path)?;
    let mut order = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if !(line.starts_with("ATOM") || line.starts_with("HETATM")) {
            continue;
        }
        let atom_name = line.get(12..16).unwrap_or("").trim();
        let res_name = line.get(17..21).unwrap_or("").trim();
        if res_name != resname.trim() || !atom_name.starts_with('S') {
            continue;
        }
        let field = line.get(22..26).unwrap_or("");
        let res_seq = field.trim().parse::<i64>().map_err(|_| IndexError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            message: format!("invalid residue number '{}'", field),
        })?;
        order.push(res_seq);
    }
    order.dedup();
    Ok(order)
}

/// Order of cysteine sulfur atoms in a GRO file, as residue numbers.
pub fn cysteine_order_from_gro(path: &Path, resname: &str) -> Result<Vec<i64>, IndexError> {
    let content = read_structure(path)?;
    let mut lines = content.lines();
    let _title = lines.next();
    let natoms = lines
        .next()
        .and_then(|l| l.trim().parse::<usize>().ok())
        .ok_or_else(|| IndexError::Parse {
            path: path.to_path_buf(),
            line: 2,
            message: "missing atom count".to_string(),
        })?;

    let mut order = Vec::new();
    for (i, line) in lines.take(natoms).enumerate() {
        let truncated = || IndexError::Parse {
            path: path.to_path_buf(),
            line: i + 3,
            message: "truncated or malformed atom record".to_string(),
        };
        let res_field = line.get(0..5).ok_or_else(truncated)?;
        let res_name = line.get(5..10).ok_or_else(truncated)?.trim();
        let atom_name = line.get(10..15).ok_or_else(truncated)?.trim();
        if res_name != resname.trim() || !atom_name.starts_with('S') {
            continue;
        }
        let res_nr = res_field.trim().parse::<i64>().map_err(|_| IndexError::Parse {
            path: path.to_path_buf(),
            line: i + 3,
            message: format!("invalid residue number '{}'", res_field),
        })?;
        order.push(res_nr);
    }
    order.dedup();
    Ok(order)
}

/// Cysteine order from a PDB or GRO file, chosen by extension.
pub fn cysteine_order_from_structure(path: &Path, resname: &str) -> Result<Vec<i64>, IndexError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("gro") => cysteine_order_from_gro(path, resname),
        Some(ext) if ext.eq_ignore_ascii_case("pdb") || ext.eq_ignore_ascii_case("ent") => {
            cysteine_order_from_pdb(path, resname)
        }
        _ => Err(IndexError::Parse {
            path: PathBuf::from(path),
            line: 0,
            message: "cysteine order can only be read from .pdb or .gro files".to_string(),
        }),
    }
}

fn read_structure(path: &Path) -> Result<String, IndexError> {
    fs::read_to_string(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Compression;
    use tempfile::TempDir;

    fn builder(resids: &[i64]) -> IndexBuilder {
        let env = ToolEnvironment::new(
            ToolCommand::new("make_ndx"),
            ToolCommand::new("g_dist"),
            ToolCommand::with_args("gzip", ["-c"]),
            Compression::Gzip,
        );
        let config = AccessibilityConfig::from_resids(resids, Some(1.2), "/run").unwrap();
        IndexBuilder::new(&env, &config)
    }

    #[test]
    fn test_commands_rename_in_ascending_order() {
        let commands = builder(&[10, 5, 42]).commands();
        assert_eq!(
            commands,
            vec![
                "keep 0",
                "del 0",
                "r CYSH & t S",
                "splitres 0",
                "del 0",
                "name 0 Cys5",
                "name 1 Cys10",
                "name 2 Cys42",
                "t OW",
                "q",
            ]
        );
    }

    #[test]
    fn test_commands_follow_selection_names() {
        let commands = builder(&[1])
            .with_selection(SelectionNames {
                cysteine_resname: "CYS".into(),
                sulfur_type: "SH".into(),
                water_oxygen_type: "OW_spc".into(),
            })
            .commands();
        assert_eq!(commands[2], "r CYS & t SH");
        assert_eq!(commands[6], "t OW_spc");
    }

    #[test]
    fn test_parse_index() {
        let text = "[ Cys5 ]\n  45\n[ Cys10 ]\n 120\n[ OW ]\n 1001 1004 1007\n 1010\n";
        let groups = parse_index(text, Path::new("cys.ndx")).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].name, "Cys5");
        assert_eq!(groups[2].atoms, vec![1001, 1004, 1007, 1010]);
    }

    #[test]
    fn test_parse_index_errors_carry_line() {
        let err = parse_index("12 13\n[ A ]\n", Path::new("x.ndx")).unwrap_err();
        assert!(matches!(err, IndexError::Parse { line: 1, .. }));
        let err = parse_index("[ A ]\n 1 x\n", Path::new("x.ndx")).unwrap_err();
        assert!(matches!(err, IndexError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_group_count_permissive_and_strict() {
        let groups = parse_index("[ Cys5 ]\n1\n[ Cys10 ]\n2\n[ OW ]\n3\n", Path::new("n")).unwrap();
        assert_eq!(check_group_count(&groups, 2, "OW", true).unwrap(), 2);
        assert_eq!(check_group_count(&groups, 3, "OW", false).unwrap(), 2);
        assert!(matches!(
            check_group_count(&groups, 3, "OW", true),
            Err(IndexError::GroupCountMismatch { expected: 3, found: 2 })
        ));
    }

    #[test]
    fn test_structure_count_is_always_strict() {
        let path = Path::new("md.pdb");
        assert!(check_structure_count(path, &[5, 10], 2).is_ok());
        assert!(matches!(
            check_structure_count(path, &[], 2),
            Err(IndexError::StructureCountMismatch { expected: 2, found: 0, .. })
        ));
        assert!(matches!(
            check_structure_count(path, &[5, 10, 42], 2),
            Err(IndexError::StructureCountMismatch { expected: 2, found: 3, .. })
        ));
    }

    #[test]
    fn test_positional_binding_mislabels_unsorted_structure() {
        // Structure lists Cys42 before Cys5 and Cys10.
        let configured = [5, 10, 42];
        let structure = [42, 5, 10];
        let bindings = positional_labels(&structure, &configured);
        assert_eq!(bindings[0].label.as_deref(), Some("Cys5"));
        assert_eq!(bindings[0].structure_resid, 42);

        let wrong = verify_label_order(&structure, &configured);
        assert_eq!(wrong.len(), 3);
        assert_eq!(
            wrong[0],
            Mislabel {
                structure_resid: 42,
                assigned_label: "Cys5".into()
            }
        );

        assert!(verify_label_order(&[5, 10, 42], &configured).is_empty());
    }

    #[test]
    fn test_positional_binding_with_fewer_labels() {
        let bindings = positional_labels(&[3, 8], &[3]);
        assert_eq!(bindings[1].label, None);
        assert!(verify_label_order(&[3, 8], &[3]).is_empty());
    }

    #[test]
    fn test_cysteine_order_from_pdb_and_gro() {
        let tmp = TempDir::new().unwrap();
        let pdb = tmp.path().join("prot.pdb");
        fs::write(
            &pdb,
            "\
ATOM      1  N   CYSH   42      10.000  10.000  10.000  1.00  0.00           N
ATOM      2  SG  CYSH   42      11.000  10.000  10.000  1.00  0.00           S
ATOM      3  CA  ALA    43      12.000  10.000  10.000  1.00  0.00           C
ATOM      4  SG  CYSH    5      13.000  10.000  10.000  1.00  0.00           S
",
        )
        .unwrap();
        assert_eq!(cysteine_order_from_pdb(&pdb, "CYSH").unwrap(), vec![42, 5]);
        assert!(cysteine_order_from_pdb(&pdb, "CYS").unwrap().is_empty());

        let gro = tmp.path().join("prot.gro");
        fs::write(
            &gro,
            "\
title
    3
   10CYSH    SG    1   1.000   1.000   1.000
   11ALA     CA    2   1.100   1.000   1.000
    7CYSH    SG    3   1.200   1.000   1.000
   1.0   1.0   1.0
",
        )
        .unwrap();
        assert_eq!(cysteine_order_from_gro(&gro, "CYSH").unwrap(), vec![10, 7]);
        assert_eq!(cysteine_order_from_structure(&gro, "CYSH").unwrap(), vec![10, 7]);
        assert!(cysteine_order_from_structure(Path::new("md.tpr"), "CYSH").is_err());
    }

    #[test]
    fn test_gromacs_pdb_order_exposes_mislabel() {
        let tmp = TempDir::new().unwrap();
        let pdb = tmp.path().join("conf.pdb");
        fs::write(
            &pdb,
            "\
ATOM      1  SG  CYSH   42      11.000  10.000  10.000  1.00  0.00
ATOM      2  SG  CYS A   7      12.000  10.000  10.000  1.00  0.00
ATOM      3  SG  CYSH    5      13.000  10.000  10.000  1.00  0.00
",
        )
        .unwrap();
        let order = cysteine_order_from_structure(&pdb, "CYSH").unwrap();
        assert_eq!(order, vec![42, 5]);
        let wrong = verify_label_order(&order, &[5, 42]);
        assert_eq!(wrong.len(), 2);
        assert_eq!(wrong[0].assigned_label, "Cys5");

        let chained = cysteine_order_from_structure(&pdb, "CYS").unwrap();
        assert_eq!(chained, vec![7]);
    }

    #[test]
    fn test_non_ascii_structure_lines_do_not_panic() {
        let tmp = TempDir::new().unwrap();
        let pdb = tmp.path().join("odd.pdb");
        fs::write(&pdb, "ATOM      1  Sé  CYSH   4\nATOM  ñ\n").unwrap();
        assert!(cysteine_order_from_pdb(&pdb, "CYSH").unwrap().is_empty());

        // resSeq column starts inside a two-byte character.
        fs::write(&pdb, "ATOM      1  SG  CYSHé 4    \n").unwrap();
        assert!(matches!(
            cysteine_order_from_pdb(&pdb, "CYSH"),
            Err(IndexError::Parse { line: 1, .. })
        ));

        let gro = tmp.path().join("odd.gro");
        fs::write(&gro, "title\n    1\n   1CYSé   SG    1   1.0   1.0   1.0\n").unwrap();
        assert!(cysteine_order_from_gro(&gro, "CYSH").unwrap().is_empty());

        fs::write(&gro, "title\n    1\n   1éCYSH  SG    1   1.0   1.0   1.0\n").unwrap();
        assert!(matches!(
            cysteine_order_from_gro(&gro, "CYSH"),
            Err(IndexError::Parse { line: 3, .. })
        ));
    }
}
