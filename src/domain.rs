use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const ENSEMBL_SERVER: &str = "http://www.ensembl.org/biomart";
pub const PLANTS_SERVER: &str = "http://plants.ensembl.org/biomart";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Server {
    Ensembl,
    Plants,
}

impl Server {
    pub fn default_url(self) -> &'static str {
        match self {
            Server::Ensembl => ENSEMBL_SERVER,
            Server::Plants => PLANTS_SERVER,
        }
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Server::Ensembl => write!(f, "ensembl"),
            Server::Plants => write!(f, "plants"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpeciesEntry {
    pub species_key: &'static str,
    pub dataset_id: &'static str,
    pub server: Server,
}

pub static SPECIES: &[SpeciesEntry] = &[
    SpeciesEntry {
        species_key: "homo-sapiens",
        dataset_id: "hsapiens_gene_ensembl",
        server: Server::Ensembl,
    },
    SpeciesEntry {
        species_key: "mus-musculus",
        dataset_id: "mmusculus_gene_ensembl",
        server: Server::Ensembl,
    },
    SpeciesEntry {
        species_key: "rattus-norvegicus",
        dataset_id: "rnorvegicus_gene_ensembl",
        server: Server::Ensembl,
    },
    SpeciesEntry {
        species_key: "danio-rerio",
        dataset_id: "drerio_gene_ensembl",
        server: Server::Ensembl,
    },
    SpeciesEntry {
        species_key: "drosophila-melanogaster",
        dataset_id: "dmelanogaster_gene_ensembl",
        server: Server::Ensembl,
    },
    SpeciesEntry {
        species_key: "arabidopsis-thaliana",
        dataset_id: "athaliana_eg_gene",
        server: Server::Plants,
    },
    SpeciesEntry {
        species_key: "saccharomyces-cerevisiae",
        dataset_id: "scerevisiae_gene_ensembl",
        server: Server::Ensembl,
    },
    SpeciesEntry {
        species_key: "caenorhabditis-elegans",
        dataset_id: "celegans_gene_ensembl",
        server: Server::Ensembl,
    },
    SpeciesEntry {
        species_key: "gallus-gallus",
        dataset_id: "ggallus_gene_ensembl",
        server: Server::Ensembl,
    },
    SpeciesEntry {
        species_key: "bos-taurus",
        dataset_id: "btaurus_gene_ensembl",
        server: Server::Ensembl,
    },
    SpeciesEntry {
        species_key: "sus-scrofa",
        dataset_id: "sscrofa_gene_ensembl",
        server: Server::Ensembl,
    },
];

pub fn species_keys() -> Vec<&'static str> {
    SPECIES.iter().map(|entry| entry.species_key).collect()
}

/// A species key that is known to be present in [`SPECIES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpeciesKey(&'static SpeciesEntry);

impl SpeciesKey {
    pub fn as_str(&self) -> &'static str {
        self.0.species_key
    }

    pub fn entry(&self) -> &'static SpeciesEntry {
        self.0
    }

    pub fn dataset_id(&self) -> &'static str {
        self.0.dataset_id
    }

    pub fn server(&self) -> Server {
        self.0.server
    }

    /// `homo-sapiens` -> `Homo_sapiens`
    pub fn capitalized_dir(&self) -> String {
        capitalized_dir(self.as_str())
    }

    /// `homo-sapiens` -> `homo_sapiens`
    pub fn safe_name(&self) -> String {
        self.as_str().replace('-', "_")
    }

    pub fn csv_file_name(&self) -> String {
        format!("{}_gene_annotations.csv", self.safe_name())
    }
}

impl fmt::Display for SpeciesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SpeciesKey {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SPECIES
            .iter()
            .find(|entry| entry.species_key == value)
            .map(SpeciesKey)
            .ok_or_else(|| KiraError::UnknownSpecies {
                key: value.to_string(),
                available: species_keys().join(", "),
            })
    }
}

pub fn capitalized_dir(species_key: &str) -> String {
    let mut words = species_key.split('-');
    let mut parts = Vec::new();
    if let Some(first) = words.next() {
        let mut chars = first.chars();
        let head = match chars.next() {
            Some(ch) => {
                let mut head: String = ch.to_uppercase().collect();
                head.push_str(&chars.as_str().to_lowercase());
                head
            }
            None => String::new(),
        };
        parts.push(head);
    }
    parts.extend(words.map(|word| word.to_lowercase()));
    parts.join("_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub name: &'static str,
    pub column: &'static str,
    pub optional: bool,
}

pub static ATTRIBUTES: &[Attribute] = &[
    Attribute {
        name: "ensembl_gene_id",
        column: "Ensembl Id",
        optional: false,
    },
    Attribute {
        name: "external_gene_name",
        column: "Gene symbol",
        optional: false,
    },
    Attribute {
        name: "description",
        column: "Description",
        optional: false,
    },
    Attribute {
        name: "gene_biotype",
        column: "Gene biotype",
        optional: false,
    },
    Attribute {
        name: "chromosome_name",
        column: "Chromosome",
        optional: false,
    },
    Attribute {
        name: "start_position",
        column: "Start",
        optional: false,
    },
    Attribute {
        name: "end_position",
        column: "End",
        optional: false,
    },
    Attribute {
        name: "strand",
        column: "Strand",
        optional: false,
    },
    Attribute {
        name: "entrezgene_id",
        column: "Entrez ID",
        optional: false,
    },
    Attribute {
        name: "uniprot_gn_id",
        column: "UniProt ID",
        optional: true,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeVariant {
    Full,
    Reduced,
}

impl AttributeVariant {
    /// Variants in the order a fetch tries them.
    pub const FALLBACK_ORDER: [AttributeVariant; 2] =
        [AttributeVariant::Full, AttributeVariant::Reduced];

    pub fn attribute_set(self) -> AttributeSet {
        let attributes = ATTRIBUTES
            .iter()
            .filter(|attr| match self {
                AttributeVariant::Full => true,
                AttributeVariant::Reduced => !attr.optional,
            })
            .copied()
            .collect();
        AttributeSet {
            variant: self,
            attributes,
        }
    }
}

impl fmt::Display for AttributeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeVariant::Full => write!(f, "full"),
            AttributeVariant::Reduced => write!(f, "reduced"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSet {
    variant: AttributeVariant,
    attributes: Vec<Attribute>,
}

impl AttributeSet {
    pub fn variant(&self) -> AttributeVariant {
        self.variant
    }

    pub fn width(&self) -> usize {
        self.attributes.len()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.attributes.iter().map(|attr| attr.name).collect()
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.attributes.iter().map(|attr| attr.column).collect()
    }
}
