use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::domain::SpeciesKey;
use crate::error::KiraError;
use crate::table::AnnotationTable;

/// On-disk layout: `<root>/<Capitalized_dir>/<safe_name>_gene_annotations.csv`.
#[derive(Debug, Clone)]
pub struct Store {
    output_root: Utf8PathBuf,
}

impl Store {
    pub fn new(output_root: Utf8PathBuf) -> Self {
        Self { output_root }
    }

    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    pub fn species_dir(&self, species: &SpeciesKey) -> Utf8PathBuf {
        self.output_root.join(species.capitalized_dir())
    }

    pub fn annotation_path(&self, species: &SpeciesKey) -> Utf8PathBuf {
        self.species_dir(species).join(species.csv_file_name())
    }

    pub fn ensure_species_dir(&self, species: &SpeciesKey) -> Result<Utf8PathBuf, KiraError> {
        let dir = self.species_dir(species);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("create {dir}: {err}")))?;
        Ok(dir)
    }

    /// Serializes `table` next to `path` and renames it into place, replacing
    /// any previous file.
    pub fn write_table_atomic(path: &Utf8Path, table: &AnnotationTable) -> Result<(), KiraError> {
        let parent = path
            .parent()
            .ok_or_else(|| KiraError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".kira-ga")
            .suffix(".csv.tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        table.write_csv(&mut temp)?;
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
