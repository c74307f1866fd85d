use std::io::Write;

use crate::domain::AttributeSet;
use crate::error::KiraError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord(Vec<String>);

impl AnnotationRecord {
    pub fn fields(&self) -> &[String] {
        &self.0
    }
}

/// Rows parsed from a BioMart TSV response, all as wide as `attributes`.
#[derive(Debug, Clone)]
pub struct AnnotationTable {
    attributes: AttributeSet,
    records: Vec<AnnotationRecord>,
}

impl AnnotationTable {
    /// Blank lines are skipped. An empty body, or any line whose field count
    /// differs from the attribute set, is an `AttributeMismatch`.
    pub fn parse_tsv(text: &str, attributes: AttributeSet) -> Result<Self, KiraError> {
        let expected = attributes.width();
        let mut records = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let fields = line
                .split('\t')
                .map(|value| value.to_string())
                .collect::<Vec<_>>();
            if fields.len() != expected {
                return Err(KiraError::AttributeMismatch {
                    expected,
                    found: fields.len(),
                    line: index + 1,
                });
            }
            records.push(AnnotationRecord(fields));
        }

        if records.is_empty() {
            return Err(KiraError::AttributeMismatch {
                expected,
                found: 0,
                line: 0,
            });
        }

        Ok(Self {
            attributes,
            records,
        })
    }

    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    pub fn records(&self) -> &[AnnotationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), KiraError> {
        let mut csv_writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        csv_writer
            .write_record(self.attributes.columns())
            .map_err(|err| KiraError::Csv(err.to_string()))?;
        for record in &self.records {
            csv_writer
                .write_record(record.fields())
                .map_err(|err| KiraError::Csv(err.to_string()))?;
        }
        csv_writer
            .flush()
            .map_err(|err| KiraError::Csv(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::AttributeVariant;

    const FULL_ROW: &str =
        "ENSG00000141510\tTP53\ttumor protein p53\tprotein_coding\t17\t7661779\t7687546\t-1\t7157\tP04637";

    #[test]
    fn parse_full_rows() {
        let text = format!("{FULL_ROW}\n{FULL_ROW}\n");
        let table =
            AnnotationTable::parse_tsv(&text, AttributeVariant::Full.attribute_set()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records()[0].fields()[1], "TP53");
        assert_eq!(table.records()[0].fields()[9], "P04637");
    }

    #[test]
    fn keeps_empty_trailing_fields() {
        let text = "ENSG1\t\t\tlncRNA\t1\t10\t20\t1\t\t\n";
        let table =
            AnnotationTable::parse_tsv(text, AttributeVariant::Full.attribute_set()).unwrap();
        assert_eq!(table.records()[0].fields().len(), 10);
        assert_eq!(table.records()[0].fields()[9], "");
    }

    #[test]
    fn empty_body_is_mismatch() {
        let err =
            AnnotationTable::parse_tsv("\n", AttributeVariant::Full.attribute_set()).unwrap_err();
        assert_matches!(err, KiraError::AttributeMismatch { found: 0, line: 0, .. });
    }

    #[test]
    fn narrow_line_is_mismatch() {
        let text = format!("{FULL_ROW}\nENSG2\tX\n");
        let err =
            AnnotationTable::parse_tsv(&text, AttributeVariant::Full.attribute_set()).unwrap_err();
        assert_matches!(
            err,
            KiraError::AttributeMismatch {
                expected: 10,
                found: 2,
                line: 2
            }
        );
    }

    #[test]
    fn csv_quotes_commas_in_description() {
        let text = "ENSG1\tA1BG\talpha-1-B glycoprotein, secreted\tprotein_coding\t19\t1\t2\t-1\t1";
        let table =
            AnnotationTable::parse_tsv(text, AttributeVariant::Reduced.attribute_set()).unwrap();
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let csv = String::from_utf8(out).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("Ensembl Id,Gene symbol,Description,Gene biotype,Chromosome,Start,End,Strand,Entrez ID")
        );
        assert_eq!(
            lines.next(),
            Some("ENSG1,A1BG,\"alpha-1-B glycoprotein, secreted\",protein_coding,19,1,2,-1,1")
        );
        assert_eq!(lines.next(), None);
    }
}
