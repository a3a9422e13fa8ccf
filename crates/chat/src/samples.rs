//! Built-in sample documents and prompts for the presentation layer.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDoc {
    pub id: &'static str,
    pub title: &'static str,
    pub category: &'static str,
    pub preview: &'static str,
    pub content: &'static str,
}

pub const STARTER_QUESTIONS: [&str; 5] = [
    "What are the key terms and conditions?",
    "Summarize this document in 3 bullet points",
    "What are the main obligations and deadlines?",
    "Are there any risks or red flags I should know about?",
    "What happens if either party breaches this agreement?",
];

pub const SAMPLE_DOCS: [SampleDoc; 3] = [
    SampleDoc {
        id: "employment-contract",
        title: "Employment Contract",
        category: "Legal",
        preview: "Standard employment agreement with IP clause",
        content: EMPLOYMENT_CONTRACT,
    },
    SampleDoc {
        id: "research-paper",
        title: "Exercise Science Abstract",
        category: "Research",
        preview: "Carbohydrate intake and threshold testing in trained cyclists",
        content: RESEARCH_ABSTRACT,
    },
    SampleDoc {
        id: "product-spec",
        title: "Product Requirements Doc",
        category: "Product",
        preview: "Feature specification for an in-app document assistant",
        content: PRODUCT_REQUIREMENTS,
    },
];

pub fn find_sample(id: &str) -> Option<&'static SampleDoc> {
    SAMPLE_DOCS.iter().find(|sample| sample.id == id)
}

/// Size summary shown next to the document editor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentStats {
    pub chars: usize,
    pub words: usize,
}

impl DocumentStats {
    pub fn of(text: &str) -> Self {
        Self {
            chars: text.chars().count(),
            words: text.split_whitespace().count(),
        }
    }
}

const EMPLOYMENT_CONTRACT: &str = "EMPLOYMENT AGREEMENT

This Employment Agreement (\"Agreement\") is made on March 3, 2026, between Northwind Analytics Ltd. (\"Company\") and Priya Raman (\"Employee\").

1. POSITION. Employee is hired as Senior Data Engineer, reporting to the Head of Platform. Employment begins on April 1, 2026.

2. COMPENSATION. Company pays an annual base salary of $148,000, in semi-monthly installments, and a discretionary bonus of up to 12% of base salary, reviewed each January.

3. PROBATION. The first 90 days are a probationary period. During probation either party may terminate with one week of written notice.

4. TERMINATION. After probation, either party may terminate with 30 days of written notice. Company may terminate immediately for cause, including gross misconduct or material breach of this Agreement.

5. INTELLECTUAL PROPERTY. All work product created by Employee within the scope of employment, including code, models and documentation, is the exclusive property of Company. Employee assigns all rights in such work product to Company.

6. CONFIDENTIALITY. Employee shall not disclose Company confidential information during employment or for two (2) years afterwards.

7. NON-SOLICITATION. For twelve (12) months after termination, Employee shall not solicit Company clients or employees.

8. BREACH. If Employee breaches Sections 5, 6 or 7, Company may seek injunctive relief in addition to damages. Disputes are governed by the laws of the State of New York.";

const RESEARCH_ABSTRACT: &str = "Journal of Applied Exercise Physiology - Research Article

PRE-EXERCISE CARBOHYDRATE DOES NOT SHIFT THE FIRST VENTILATORY THRESHOLD IN TRAINED CYCLISTS: A RANDOMIZED CROSSOVER STUDY

Background: The first ventilatory threshold (VT1) is widely used to set training zones. It is unclear whether pre-test nutrition changes where VT1 is detected.

Methods: Fourteen trained cyclists (11 male, 3 female; VO2max 61 +/- 5 ml/kg/min) completed two incremental ramp tests one week apart, after ingesting either 1 g/kg carbohydrate or a taste-matched placebo 45 minutes beforehand. VT1 was identified by two blinded assessors.

Results: Power output at VT1 did not differ between conditions (carbohydrate 198 +/- 24 W vs placebo 196 +/- 27 W; p = 0.61). Respiratory exchange ratio was higher after carbohydrate at all submaximal stages (p < 0.01).

Conclusions: A single pre-exercise carbohydrate dose raises carbohydrate oxidation but does not meaningfully alter VT1. Coaches can compare threshold tests without strictly standardizing the pre-test meal, although standardization remains good practice.

Limitations: Small sample, a single dose, and no measurement of muscle glycogen.";

const PRODUCT_REQUIREMENTS: &str = "PRODUCT REQUIREMENTS DOCUMENT
Feature: In-App Document Assistant
Product: CaseDesk 3.0
Owner: Morgan Lee (Product)
Target release: Q3 2026

1. PROBLEM. Reviewers spend an average of 40 minutes locating clauses in long contracts. Support tickets show users want to ask questions in plain language.

2. GOALS.
- Answer questions grounded only in the open document.
- Quote the supporting passage for every answer.
- First visible token within 1.5 seconds at p95.

3. NON-GOALS. Cross-document search, document editing, and storing chat history are out of scope for this release.

4. REQUIREMENTS.
R1. Users can paste or select a document of up to 100,000 characters.
R2. Answers stream token by token.
R3. If the answer is not in the document, the assistant says so.
R4. Document text is never persisted server-side.

5. RISKS. Hallucinated citations would damage trust; mitigation is mandatory quoting plus a visible disclaimer. Model latency spikes could break the p95 target.

6. MILESTONES. Design review by June 15, beta to 50 accounts by August 1, general availability by September 30.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_ids_are_unique_and_findable() {
        for sample in SAMPLE_DOCS.iter() {
            assert_eq!(find_sample(sample.id), Some(sample));
            assert!(!sample.content.trim().is_empty());
        }
        assert!(find_sample("missing").is_none());
    }

    #[test]
    fn stats_count_characters_and_words() {
        assert_eq!(DocumentStats::of(""), DocumentStats::default());
        assert_eq!(
            DocumentStats::of("  The sky\n is   blue. "),
            DocumentStats { chars: 22, words: 4 }
        );
        assert_eq!(DocumentStats::of("héllo wörld").chars, 11);
    }
}
