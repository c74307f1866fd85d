use std::fs;

use camino::Utf8PathBuf;

use kira_gene_annotations::domain::{AttributeVariant, SpeciesKey};
use kira_gene_annotations::store::Store;
use kira_gene_annotations::table::AnnotationTable;

fn yeast_table(rows: &str) -> AnnotationTable {
    AnnotationTable::parse_tsv(rows, AttributeVariant::Reduced.attribute_set()).unwrap()
}

#[test]
fn writes_species_csv_under_capitalized_dir() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
    let store = Store::new(root.clone());
    let species: SpeciesKey = "saccharomyces-cerevisiae".parse().unwrap();

    let dir = store.ensure_species_dir(&species).unwrap();
    let path = store.annotation_path(&species);
    let table = yeast_table(
        "YAL001C\tTFC3\tsubunit of TFIIIC, \"tau 138\"\tprotein_coding\tI\t147594\t151166\t-1\t851230\n",
    );
    Store::write_table_atomic(&path, &table).unwrap();

    assert_eq!(dir, root.join("Saccharomyces_cerevisiae"));
    assert_eq!(
        path,
        root.join("Saccharomyces_cerevisiae/saccharomyces_cerevisiae_gene_annotations.csv")
    );
    let csv = fs::read_to_string(&path).unwrap();
    assert_eq!(
        csv,
        "Ensembl Id,Gene symbol,Description,Gene biotype,Chromosome,Start,End,Strand,Entrez ID\n\
         YAL001C,TFC3,\"subunit of TFIIIC, \"\"tau 138\"\"\",protein_coding,I,147594,151166,-1,851230\n"
    );
}

#[test]
fn rewrite_replaces_previous_file() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new(root);
    let species: SpeciesKey = "saccharomyces-cerevisiae".parse().unwrap();
    let dir = store.ensure_species_dir(&species).unwrap();
    let path = store.annotation_path(&species);

    Store::write_table_atomic(
        &path,
        &yeast_table(
            "YAL001C\tTFC3\tx\tprotein_coding\tI\t1\t2\t-1\t1\nYAL002W\tVPS8\ty\tprotein_coding\tI\t3\t4\t1\t2\n",
        ),
    )
    .unwrap();
    Store::write_table_atomic(
        &path,
        &yeast_table("YAL001C\tTFC3\tx\tprotein_coding\tI\t1\t2\t-1\t1\n"),
    )
    .unwrap();

    let csv = fs::read_to_string(&path).unwrap();
    assert_eq!(csv.lines().count(), 2);
    let entries = fs::read_dir(&dir).unwrap().count();
    assert_eq!(entries, 1);
}
