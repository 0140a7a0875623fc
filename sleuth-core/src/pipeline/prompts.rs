//! Fixed prompt templates for the model-backed stages.
//!
//! The deep analysis template names a fixed subject (PUMA's public relations
//! activity in Taiwan) and is not parameterised on the submitted query.
//! Web search likewise receives the raw query, not the intent analysis.

/// Subject hard-wired into the deep analysis template.
pub const ANALYSIS_SUBJECT: &str = "PUMA's public relations activities in Taiwan";

/// Stage 1: ask for six labelled fields describing the query.
pub fn intent_prompt(query: &str) -> String {
    format!(
        r#"
Analyze the main intent and key elements of the following query and answer in plain text:

Query: {query}

Use exactly this layout:
Main topic:
Keywords:
Time range:
Location:
Domain:
Purpose:
"#
    )
}

/// Stage 3: bucket the rendered search results into five fixed categories.
pub fn classification_prompt(search_results: &str) -> String {
    format!(
        r#"
Classify the following search results and answer in plain text:

{search_results}

Use these categories:

Brand campaigns:
- [campaign name] - [date] - [short description]

Marketing activities:
- [activity name] - [date] - [short description]

Corporate partnerships:
- [partnership] - [date] - [short description]

Social responsibility:
- [project name] - [date] - [short description]

Other activities:
- [activity name] - [date] - [short description]
"#
    )
}

/// Stage 4: the fixed-subject analytic template.
pub fn analysis_prompt() -> String {
    format!(
        r#"
Provide an in-depth analysis of {ANALYSIS_SUBJECT} and answer in plain text:

Timeline:
[important activities in chronological order]

Main strategic directions:
1. [strategy 1]
2. [strategy 2]
...

Target audiences:
1. [audience 1]
2. [audience 2]
...

Campaign characteristics:
1. [characteristic 1]
2. [characteristic 2]
...

Effectiveness:
1. [outcome 1]
2. [outcome 2]
...
"#
    )
}

/// Stage 5: findings, trends, recommendations, risks and outlook.
pub fn insights_prompt() -> String {
    r#"
Based on the analysis above, give concrete insights and recommendations in plain text:

Key findings:
1. [finding 1]
2. [finding 2]
3. [finding 3]

Trends:
1. [trend 1]
2. [trend 2]

Recommendations:
1. [recommendation 1]
2. [recommendation 2]

Risks to watch:
1. [risk 1]
2. [risk 2]

Outlook:
[brief description of likely future developments]
"#
    .to_string()
}
