//! A tiny Synthea-shaped dataset: two patients, three encounters.
//!
//! `E1` has observations, conditions and medications; `E2` has only a
//! condition; `E3` has no linked records at all.

use std::{fs, path::Path};

use encounter_docgen::dataset::{Dataset, Table};

pub const PATIENTS_CSV: &str = "\
Id,BIRTHDATE,DEATHDATE,SSN,DRIVERS,PASSPORT,PREFIX,FIRST,LAST,SUFFIX,MAIDEN,MARITAL,RACE,ETHNICITY,GENDER,BIRTHPLACE,ADDRESS,CITY,STATE,COUNTY,ZIP,LAT,LON,HEALTHCARE_EXPENSES,HEALTHCARE_COVERAGE
P1,1961-04-12,,999-41-2231,S99912345,X123456X,Mr.,Jose,Rivera,,,M,white,hispanic,M,Boston Massachusetts US,12 Elm St,Boston,Massachusetts,Suffolk County,02118,42.34,-71.07,271342.11,1532.75
P2,1990-09-30,,999-72-1180,,,Ms.,Ana,Lopez,,,S,black,nonhispanic,F,Quincy Massachusetts US,4 Oak Ave,Quincy,Massachusetts,Norfolk County,,42.25,-71.00,9821.50,411.00
";

pub const ENCOUNTERS_CSV: &str = "\
Id,START,STOP,PATIENT,ORGANIZATION,PROVIDER,PAYER,ENCOUNTERCLASS,CODE,DESCRIPTION,BASE_ENCOUNTER_COST,TOTAL_CLAIM_COST,PAYER_COVERAGE,REASONCODE,REASONDESCRIPTION
E1,2019-02-16T09:42:55Z,2019-02-16T10:12:55Z,P1,ORG1,PR1,PY1,ambulatory,185345009,Encounter for symptom,129.16,129.16,69.16,10509002,Acute bronchitis (disorder)
E2,2020-06-01T08:00:00Z,2020-06-01T08:30:00Z,P2,ORG1,PR2,PY1,wellness,162673000,General examination of patient,129.16,129.16,129.16,,
E3,2021-01-05T14:00:00Z,2021-01-05T14:15:00Z,P1,ORG2,PR1,PY2,outpatient,185349003,Encounter for check up,88.20,88.20,0.00,,
";

pub const OBSERVATIONS_CSV: &str = "\
DATE,PATIENT,ENCOUNTER,CATEGORY,CODE,DESCRIPTION,VALUE,UNITS,TYPE
2019-02-16T09:42:55Z,P1,E1,vital-signs,8480-6,Systolic Blood Pressure,142,mm[Hg],numeric
2019-02-16T09:42:55Z,P1,E1,vital-signs,8462-4,Diastolic Blood Pressure,91,mm[Hg],numeric
2019-02-16T09:42:55Z,P1,E1,vital-signs,8310-5,Body temperature,38.2,Cel,numeric
";

pub const CONDITIONS_CSV: &str = "\
START,STOP,PATIENT,ENCOUNTER,CODE,DESCRIPTION
2019-02-16,2019-03-02,P1,E1,10509002,Acute bronchitis (disorder)
2020-06-01,,P2,E2,162864005,Body mass index 30+ - obesity (finding)
";

pub const MEDICATIONS_CSV: &str = "\
START,STOP,PATIENT,PAYER,ENCOUNTER,CODE,DESCRIPTION,BASE_COST,PAYER_COVERAGE,DISPENSES,TOTALCOST,REASONCODE,REASONDESCRIPTION
2019-02-16T09:42:55Z,2019-02-26T09:42:55Z,P1,PY1,E1,313782,Acetaminophen 325 MG Oral Tablet,8.14,0.00,1,8.14,10509002,Acute bronchitis (disorder)
";

pub const TABLES: [(&str, &str); 5] = [
    ("patients", PATIENTS_CSV),
    ("encounters", ENCOUNTERS_CSV),
    ("observations", OBSERVATIONS_CSV),
    ("conditions", CONDITIONS_CSV),
    ("medications", MEDICATIONS_CSV),
];

pub fn dataset() -> Dataset {
    Dataset::from_tables(TABLES.iter().map(|(name, csv)| {
        Table::from_reader(*name, csv.as_bytes()).expect("fixture table parses")
    }))
}

pub fn write_dir(dir: &Path) {
    for (name, csv) in TABLES {
        fs::write(dir.join(format!("{name}.csv")), csv).expect("fixture table written");
    }
}
