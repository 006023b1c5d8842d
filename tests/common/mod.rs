//! Fixtures and helpers shared across the integration tests.

#![allow(dead_code)]

use catmassage::marcxml::marcxml_to_records;
use catmassage::massage::{massage_files, InputPaths};
use catmassage::{MarcReader, MassageConfig, MassageReport, OutputLayout, Record};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

/// Catalogue export: a deleted record, two titles with copies and one whose
/// only copy belongs to an excluded branch.
pub const CATALOGUE: &str = "
*000     d
*0010379371
*24510$aXXX
^
*000     c
*0010379371
*019  $bl
*008920916                a          0 nob
*092  $aMILJØHYLLA
*090  $c641.3$dGra
*100 0$aGrahl-Nielsen, Thora$d1901-$jn.$326452400
*24510$aUgress er også mat$bopskrifter og aktuelle surrogater av ville vekster$c[Av] Thora Grahl-Nielsen [og] Astrid Karlsen
^
*000     n
*0011245593
*008120228                a          00nob 2
*019  $s18$bl
*100 0$aMärtha Louise$cprinsesse, datter av Harald V, konge av Norge$d1971-$jn.$1948.1055092$6923.148 z, 948.1055 x$316549700
*24510$aEnglenes hemmeligheter$bderes natur, språk og hvordan du åpner opp for dem$cPrinsesse Märtha Louise, Elisabeth Nordeng
*521  $aNoteThatShouldBeOverwrittenByAgeLimit
^
*000     c
*0010192529
*008900326                a          10dan
*019  $bdi|dr
*100 0$aBrú, Heðin$d1901-1987$jfær.$312827600
*24510$aFjeldskyggen$bnoveller og skitser$cPå dansk ved Gunnvá og Poul Skårup
^
";

/// Exemplar dump: loan branch and loan category per copy.
pub const EXEMPLARS: &str = "
*0010379371
*0020000001
*015  $aNO:02030000:1003010379371001 ::rfidE004015012C80BFB ::03010379371001
*101  $ahutl$d42529
^
*0011245593
*0020000001
*017  $a40963
*100  $a42498$t101613$chvua$fLaanerkategori$lNormal
*101  $b2023500$f41927$t15:29:13$ahvua$d42492
^
*0011245593
*0020000003
*101  $ahutl$d42428
*250  $aDagslån
^
*0011245593
*0020000006
*100  $a42571$t162715$cfboa$fLaanerkategori$lNormal
*101  $afboa$d42165
^
";

/// One ledger record for a copy of `title`.
pub fn copy(title: &str, number: &str, branch: &str, shelf: &str, status: &str, loans: &str) -> String {
    format!(
        "ex_titnr |{title}|\nex_exnr |{number}|\nex_avd |{branch}|\nex_plass |{shelf}|\n\
         ex_hylle ||\nex_note ||\nex_bind |0|\nex_aar |0|\nex_status |{status}|\nex_resstat ||\n\
         ex_laanstat ||\nex_utlkode ||\nex_laanr |-9964745|\nex_laantid |28|\n\
         ex_forfall |00/00/0000|\nex_purrdat |00/00/0000|\nex_antpurr |0|\nex_etikett ||\n\
         ex_antlaan |{loans}|\nex_kl_sett |0|\nex_strek |0|\n^\n"
    )
}

/// Item ledger matching [`CATALOGUE`].
pub fn ledger() -> String {
    [
        copy("379371", "1", "xyz", "m", "", "8"),
        copy("379371", "2", "hutl", "m", "y", "14"),
        copy("1245593", "1", "hutl", "", "", "23"),
        copy("1245593", "2", "hutl", "", "", "24"),
        copy("1245593", "3", "hutl", "", "", "14"),
        copy("1245593", "4", "ffur", "BEDRE LIV", "", "27"),
        copy("1245593", "5", "fmaj", "", "", "44"),
        copy("1245593", "6", "fbol", "Livsstil", "", "28"),
        copy("1245593", "7", "fnyd", "", "", "6"),
        copy("192529", "1", "dfb", "m", "", "8"),
    ]
    .concat()
}

/// Input files written into a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub inputs: InputPaths,
}

impl Fixture {
    /// Write a catalogue, a ledger and optionally an exemplar dump.
    pub fn new(catalogue: &str, ledger: &str, exemplars: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let catalogue_path = dir.path().join("vmarc.txt");
        let ledger_path = dir.path().join("exemp.txt");
        fs::write(&catalogue_path, catalogue).unwrap();
        fs::write(&ledger_path, ledger).unwrap();
        let exemplar_path = exemplars.map(|content| {
            let path = dir.path().join("emarc.txt");
            fs::write(&path, content).unwrap();
            path
        });
        Fixture {
            dir,
            inputs: InputPaths {
                catalogue: catalogue_path,
                ledger: ledger_path,
                exemplars: exemplar_path,
                format: None,
            },
        }
    }

    /// The standard sample data.
    pub fn sample() -> Self {
        Fixture::new(CATALOGUE, &ledger(), Some(EXEMPLARS))
    }

    /// Run into `<tempdir>/<name>` and return the layout and report.
    pub fn run(&self, name: &str, config: &MassageConfig) -> (OutputLayout, MassageReport) {
        let layout = OutputLayout::new(self.dir.path().join(name));
        let report = massage_files(&self.inputs, &layout, config).unwrap();
        (layout, report)
    }
}

/// Read every record of an ISO 2709 file.
pub fn read_iso2709(path: &Path) -> Vec<Record> {
    let data = fs::read(path).unwrap();
    let mut reader = MarcReader::new(Cursor::new(data));
    let mut records = Vec::new();
    while let Some(record) = reader.read_record().unwrap() {
        records.push(record);
    }
    records
}

/// Read every record of a MARCXML collection file.
pub fn read_marcxml(path: &Path) -> Vec<Record> {
    marcxml_to_records(&fs::read_to_string(path).unwrap()).unwrap()
}

/// Values of `code` across every item field of a record.
pub fn item_values(record: &Record, code: char) -> Vec<String> {
    record
        .fields_by_tag("952")
        .filter_map(|f| f.get_subfield(code))
        .map(str::to_string)
        .collect()
}

/// Control and data fields of a record, ignoring the leader's length and
/// base address, which only ISO 2709 output fills in.
pub fn content(record: &Record) -> (char, Vec<(String, String)>, Vec<catmassage::Field>) {
    (
        record.leader.record_status,
        record
            .control_fields_iter()
            .map(|(tag, value)| (tag.to_string(), value.to_string()))
            .collect(),
        record.fields().cloned().collect(),
    )
}

/// All output files of a run, by name.
pub fn output_bytes(layout: &OutputLayout) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = fs::read_dir(layout.dir())
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            (
                entry.file_name().to_string_lossy().to_string(),
                fs::read(entry.path()).unwrap(),
            )
        })
        .collect();
    files.sort();
    files
}
