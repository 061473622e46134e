use crate::{
    narrative::{
        ports::{FusionRequest, WriterTurnRequest},
        types::{Narrative, OracleMode},
    },
    records::Category,
};

pub fn patient_narrator_system_prompt() -> String {
    concat!(
        "You are a physician briefing a colleague about a patient before they write up an encounter.\n",
        "You receive one structured patient profile exported from an EHR system.\n",
        "Rules:\n",
        "1) Give a concise spoken-style summary focused on what matters clinically: age, sex, ",
        "relevant demographics, vital status.\n",
        "2) Leave out identifiers such as SSN, driver's license or passport numbers.\n",
        "3) Mention address details only when clinically unusual.\n",
        "4) Return plain text only."
    )
    .to_string()
}

pub fn build_patient_prompt(patient_json: &str) -> String {
    format!("<patient-profile>\n{}\n</patient-profile>", patient_json)
}

pub fn category_summarizer_system_prompt(category: Category) -> String {
    format!(
        concat!(
            "You summarize {} recorded in an EHR system for one clinical encounter.\n",
            "The reader is a clinical documentation specialist assembling a complete picture of the encounter.\n",
            "Rules:\n",
            "1) Group related entries and foreground abnormal or clinically significant values.\n",
            "2) Ignore codes and patient identifiers unless needed to tell entries apart.\n",
            "3) Keep every date and numeric value you mention exactly as given.\n",
            "4) {}\n",
            "5) Return plain text only."
        ),
        category.label(),
        category_guidance(category)
    )
}

fn category_guidance(category: Category) -> &'static str {
    match category {
        Category::Observations => {
            "Organize observations into vital signs, laboratory results and other findings."
        }
        Category::Immunizations => {
            "List vaccines chronologically with the date each was given."
        }
        Category::Medications => {
            "For each medication state the indication, start and stop dates, dispenses and whether it is ongoing."
        }
        Category::Procedures => "State each procedure with its indication and date.",
        Category::CarePlans => {
            "State each care plan with its indication, duration and whether it is still active."
        }
        Category::Conditions => {
            "State each condition with its onset date and whether it is ongoing or resolved."
        }
        Category::Devices => {
            "State each device with its dates and whether it is still in use."
        }
        Category::ImagingStudies => {
            "Organize studies by body site and name the modality used."
        }
    }
}

pub fn build_category_prompt(category: Category, records_json: &str) -> String {
    format!(
        "<{tag}>\n{}\n</{tag}>",
        records_json,
        tag = category.table().replace('_', "-")
    )
}

pub fn fuser_system_prompt() -> String {
    concat!(
        "You are a physician narrating one clinical encounter to a colleague who will write the documentation.\n",
        "You receive the structured encounter record, a narrative about the patient and one section per ",
        "record category.\n",
        "Rules:\n",
        "1) Produce one concise narrative of the encounter: setting, reason, findings, interventions and plan.\n",
        "2) A section marked ABSENT had no records for this encounter; do not invent content for it.\n",
        "3) A present section may reference events outside the encounter window. Compare its dates with the ",
        "encounter start and stop to decide whether the event happened during the encounter.\n",
        "4) Mention start and stop only when the duration is unusual.\n",
        "5) Return plain text only."
    )
    .to_string()
}

fn fusion_guidance(category: Category) -> &'static str {
    match category {
        Category::Observations => "Observations recorded during the encounter.",
        Category::Immunizations => {
            "Compare immunization dates with the encounter span to tell which were given during it."
        }
        Category::Medications => {
            "Compare medication start dates with the encounter span to tell which were prescribed during it."
        }
        Category::Procedures => "Procedures performed.",
        Category::CarePlans => {
            "Compare care plan start dates with the encounter span to tell which were created during it."
        }
        Category::Conditions => {
            "Compare condition start dates with the encounter span to tell which were diagnosed during it."
        }
        Category::Devices => {
            "Compare device start dates with the encounter span to tell which were placed during it."
        }
        Category::ImagingStudies => {
            "Compare imaging dates with the encounter span to tell which were performed during it."
        }
    }
}

pub fn build_fusion_prompt(req: &FusionRequest, encounter_json: &str) -> String {
    let mut prompt = format!(
        concat!(
            "<encounter>\n{}\n</encounter>\n\n",
            "<patient-narrative>\n{}\n</patient-narrative>\n"
        ),
        encounter_json, req.patient_narrative.text
    );

    for category in Category::ALL {
        let tag = format!("{}-narrative", category.table().replace('_', "-"));
        match req.category_narratives.get(category) {
            Some(narrative) => prompt.push_str(&format!(
                "\n<{tag} status=\"present\" guidance=\"{}\">\n{}\n</{tag}>\n",
                fusion_guidance(category),
                narrative.text
            )),
            None => prompt.push_str(&format!("\n<{tag} status=\"ABSENT\" />\n")),
        }
    }

    prompt
}

pub fn predictor_system_prompt() -> String {
    concat!(
        "You are an experienced clinical documentation specialist.\n",
        "From the narrative of one encounter, predict every clinical document that was likely written during it.\n",
        "Return strictly one JSON object: ",
        "{\"documents\": [{\"type\": \"<document type, e.g. Progress Note>\", ",
        "\"description\": \"<brief summary of its content>\"}]}\n",
        "Return {\"documents\": []} when no document was plausibly written."
    )
    .to_string()
}

pub fn build_prediction_prompt(encounter_narrative: &Narrative) -> String {
    format!(
        "<encounter-narrative>\n{}\n</encounter-narrative>",
        encounter_narrative.text
    )
}

pub fn writer_system_prompt() -> String {
    concat!(
        "You write one clinical document as it would be stored in an EHR system.\n",
        "The information you are given may be incomplete. You may ask the head physician of the case ",
        "one question per turn to fill gaps.\n",
        "Return strictly one JSON object per turn, either ",
        "{\"action\": \"ask\", \"question\": \"<one question>\"} or ",
        "{\"action\": \"finish\", \"document\": \"<complete document text>\"}.\n",
        "Incorporate every answer you received before finishing."
    )
    .to_string()
}

pub fn build_writer_prompt(req: &WriterTurnRequest) -> String {
    let mut prompt = format!(
        concat!(
            "<document-type>{}</document-type>\n",
            "<description>{}</description>\n"
        ),
        req.document.document_type, req.document.description
    );

    if !req.transcript.is_empty() {
        prompt.push_str("\n<clarifications>\n");
        for exchange in &req.transcript {
            prompt.push_str(&format!(
                "Q: {}\nA: {}\n\n",
                exchange.question, exchange.answer
            ));
        }
        prompt.push_str("</clarifications>\n");
    }

    if !req.questions_allowed {
        prompt.push_str(
            "\nNo more questions may be asked. Respond with action \"finish\" and the complete document now.",
        );
    }

    prompt
}

pub fn oracle_system_prompt(mode: OracleMode) -> String {
    match mode {
        OracleMode::Fabricate => concat!(
            "You are the head physician responsible for this encounter, answering questions from ",
            "the person writing its documentation.\n",
            "Use the statements about the encounter you are given.\n",
            "Never say that you do not know. When the statements do not contain the answer, provide ",
            "plausible, specific detail consistent with them so the writer can finish the document.\n",
            "Return plain text only."
        )
        .to_string(),
        OracleMode::Strict => concat!(
            "You are the head physician responsible for this encounter, answering questions from ",
            "the person writing its documentation.\n",
            "Answer only from the statements about the encounter you are given.\n",
            "Return strictly one JSON object: ",
            "{\"answer\": \"<answer or empty>\", \"insufficient_information\": <true|false>}. ",
            "Set insufficient_information to true when the statements do not contain the answer."
        )
        .to_string(),
    }
}

pub fn build_oracle_prompt(question: &str, narratives: &[Narrative]) -> String {
    let mut prompt = String::from("<encounter-statements>\n");
    for (index, narrative) in narratives.iter().enumerate() {
        prompt.push_str(&format!(
            "<statement index=\"{}\">\n{}\n</statement>\n",
            index, narrative.text
        ));
    }
    prompt.push_str("</encounter-statements>\n\n");
    prompt.push_str(&format!("<question>\n{}\n</question>", question));
    prompt
}

pub fn refiner_system_prompt() -> String {
    concat!(
        "You post-process an AI-written clinical document so it reads like authentic EHR output ",
        "instead of polished prose. You change style only, never content.\n",
        "Preserve facts:\n",
        "- Add no diagnosis, medication, procedure, vital, lab, allergy or event that is not already present.\n",
        "- Keep every numeric value exactly as written, e.g. BP 142/88 stays 142/88.\n",
        "- Keep diagnosis, medication, procedure and device names spelled out as written; ",
        "never abbreviate or substitute the names listed under clinical-terms.\n",
        "- Keep qualifiers such as mild, moderate, possible, rule out. Do not raise certainty.\n",
        "- Add no names or identifiers.\n",
        "Introduce realistic artifacts without changing meaning:\n",
        "- Common abbreviations where accurate: Pt, c/o, HPI, ROS, PE, NAD, WNL, SOB, s/p, hx, f/u, w/. ",
        "Keep complex or critical findings spelled out.\n",
        "- Template boilerplate such as Encounter Date:, MRN:, Provider:, Dept:, Electronically signed:.\n",
        "- Stub sections such as \"ROS: neg except as per HPI.\" or \"Allergies: NKDA\".\n",
        "- Section headers in varying case or truncated (ASSESS/PLAN), inconsistent colons (Plan - vs Plan:), ",
        "occasional separator lines, uneven spacing, telegraphic phrases.\n",
        "- Section ordering typical for the document type.\n",
        "- Terse, fragmented tone with mild redundancy; no academic prose.\n",
        "When a facility style profile is given, follow its abbreviations, headers, separators, timestamp ",
        "format and section order; otherwise use a generic mid-sized US hospital style.\n",
        "No Markdown and no code fences inside the document.\n",
        "Return strictly one JSON object: ",
        "{\"realistic_document\": \"<transformed text>\", ",
        "\"applied_transformations\": [\"<one change per entry>\"]}"
    )
    .to_string()
}

pub fn build_refiner_prompt(
    document_type: &str,
    original_document: &str,
    clinical_terms: &[String],
    facility_style_profile: Option<&str>,
) -> String {
    let mut prompt = format!(
        concat!(
            "<document-type>{}</document-type>\n\n",
            "<original-document>\n{}\n</original-document>\n"
        ),
        document_type, original_document
    );
    if !clinical_terms.is_empty() {
        prompt.push_str("\n<clinical-terms>\n");
        for term in clinical_terms {
            prompt.push_str(&format!("- {}\n", term));
        }
        prompt.push_str("</clinical-terms>\n");
    }
    if let Some(profile) = facility_style_profile {
        prompt.push_str(&format!(
            "\n<facility-style-profile>\n{}\n</facility-style-profile>\n",
            profile
        ));
    }
    prompt
}
