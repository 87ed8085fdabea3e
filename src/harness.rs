//! Harness build-spec export.
//!
//! Turns a saved idea plus a tech stack and a handful of main features into a
//! markdown build spec. `generate` lets the LLM break the main features into
//! phased, testable features; `generate_basic` renders the template alone.

use crate::idea::NormalizedIdea;
use crate::llm::{GatewayError, LlmGateway};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const MIN_MAIN_FEATURES: usize = 3;

const COST_PER_TURN: f64 = 0.015;
const COST_RANGE_FACTOR: f64 = 1.5;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Describe at least 3 main features (got {0})")]
    TooFewFeatures(usize),

    #[error("Unknown project type '{0}'")]
    UnknownProjectType(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Failed to serialize harness metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write spec: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectType {
    #[serde(rename = "SaaS")]
    Saas,
    Tool,
    #[serde(rename = "API")]
    Api,
    #[serde(rename = "Mobile App")]
    MobileApp,
    #[serde(rename = "CLI")]
    Cli,
    Library,
}

impl ProjectType {
    pub const ALL: [ProjectType; 6] = [
        ProjectType::Saas,
        ProjectType::Tool,
        ProjectType::Api,
        ProjectType::MobileApp,
        ProjectType::Cli,
        ProjectType::Library,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProjectType::Saas => "SaaS",
            ProjectType::Tool => "Tool",
            ProjectType::Api => "API",
            ProjectType::MobileApp => "Mobile App",
            ProjectType::Cli => "CLI",
            ProjectType::Library => "Library",
        }
    }
}

impl FromStr for ProjectType {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        Self::ALL
            .into_iter()
            .find(|t| t.label().replace(' ', "").eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| HarnessError::UnknownProjectType(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechStack {
    pub backend: String,
    pub database: String,
    pub frontend: String,
    pub auth: String,
    pub hosting: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    /// Estimated agent turns to implement one feature.
    pub fn turns(self) -> u32 {
        match self {
            Complexity::Simple => 7,
            Complexity::Medium => 15,
            Complexity::Complex => 35,
        }
    }

    fn parse_or_medium(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("simple") => Complexity::Simple,
            Some("complex") => Complexity::Complex,
            _ => Complexity::Medium,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessFeature {
    pub id: String,
    pub title: String,
    /// config, database, service, security, api, ui, integration, test, worker, infrastructure
    pub category: String,
    pub complexity: Complexity,
    pub depends_on: Vec<String>,
    pub acceptance_criteria: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawFeature {
    id: Option<String>,
    title: Option<String>,
    category: Option<String>,
    complexity: Option<String>,
    depends_on: Vec<String>,
    acceptance_criteria: Vec<String>,
}

impl From<RawFeature> for HarnessFeature {
    fn from(raw: RawFeature) -> Self {
        let text = |v: Option<String>, default: &str| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            id: text(raw.id, "UNKNOWN"),
            title: text(raw.title, "Untitled"),
            category: text(raw.category, "config").to_ascii_lowercase(),
            complexity: Complexity::parse_or_medium(raw.complexity.as_deref()),
            depends_on: raw.depends_on,
            acceptance_criteria: raw.acceptance_criteria,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessStats {
    pub total_features: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_complexity: BTreeMap<String, usize>,
    pub estimated_turns: u32,
    pub estimated_cost: String,
}

#[derive(Debug, Clone)]
pub struct HarnessSpec {
    pub markdown: String,
    pub features: Vec<HarnessFeature>,
    pub stats: HarnessStats,
    /// Provider that expanded the features; `None` for the template-only spec.
    pub provider: Option<&'static str>,
}

/// Everything the spec template needs.
#[derive(Debug, Clone)]
pub struct HarnessInput {
    pub project_name: String,
    pub problem_statement: String,
    pub target_audience: String,
    pub solution: String,
    pub constraints: String,
    pub differentiation: String,
    pub risks: String,
    pub next_steps: String,
    pub tech_stack: TechStack,
    pub main_features: Vec<String>,
    pub project_type: ProjectType,
}

impl HarnessInput {
    pub fn from_idea(
        idea: &NormalizedIdea,
        tech_stack: TechStack,
        main_features: Vec<String>,
        project_type: ProjectType,
    ) -> Self {
        Self {
            project_name: idea.project_name.clone(),
            problem_statement: idea.problem_statement.clone(),
            target_audience: idea.target_user.clone(),
            solution: idea.solution_summary.clone(),
            constraints: idea.constraints.clone(),
            differentiation: idea.differentiation.clone(),
            risks: idea.risks.clone(),
            next_steps: idea.next_action.clone(),
            tech_stack,
            main_features: main_features
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            project_type,
        }
    }

    fn validate(&self) -> Result<(), HarnessError> {
        if self.main_features.len() < MIN_MAIN_FEATURES {
            return Err(HarnessError::TooFewFeatures(self.main_features.len()));
        }
        Ok(())
    }
}

/// Phase headings and the feature categories each one collects.
const PHASES: &[(&str, &[&str])] = &[
    ("Phase 1: Foundation", &["config"]),
    ("Phase 2: Database", &["database"]),
    ("Phase 3: Backend Services", &["service"]),
    ("Phase 4: Security", &["security"]),
    ("Phase 5: API Endpoints", &["api"]),
    ("Phase 6: Frontend", &["ui"]),
    ("Phase 7: Integration", &["integration"]),
    ("Phase 8: Testing", &["test"]),
    ("Phase 9: DevOps", &["worker", "infrastructure"]),
];

/// Extract the JSON feature array from model text. Returns empty on any parse failure.
pub fn parse_features_from_llm(response: &str) -> Vec<HarnessFeature> {
    let (Some(start), Some(end)) = (response.find('['), response.rfind(']')) else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<RawFeature>>(&response[start..=end]) {
        Ok(raw) => raw.into_iter().map(HarnessFeature::from).collect(),
        Err(e) => {
            log::warn!("Failed to parse harness features: {}", e);
            Vec::new()
        }
    }
}

pub fn calculate_stats(features: &[HarnessFeature]) -> HarnessStats {
    let mut by_category = BTreeMap::new();
    let mut by_complexity = BTreeMap::new();
    for f in features {
        *by_category.entry(f.category.clone()).or_insert(0) += 1;
        *by_complexity.entry(f.complexity.as_str().to_string()).or_insert(0) += 1;
    }

    let estimated_turns: u32 = features.iter().map(|f| f.complexity.turns()).sum();
    let cost = f64::from(estimated_turns) * COST_PER_TURN;
    let estimated_cost = if estimated_turns == 0 {
        "$0".to_string()
    } else {
        format!("${:.0}-{:.0}", cost, cost * COST_RANGE_FACTOR)
    };

    HarnessStats {
        total_features: features.len(),
        by_category,
        by_complexity,
        estimated_turns,
        estimated_cost,
    }
}

fn features_markdown(features: &[HarnessFeature]) -> String {
    let mut md = String::new();
    for (phase, categories) in PHASES {
        let in_phase: Vec<&HarnessFeature> = features
            .iter()
            .filter(|f| categories.contains(&f.category.as_str()))
            .collect();
        if in_phase.is_empty() {
            continue;
        }

        let _ = write!(md, "\n---\n\n## {}\n\n", phase);
        for f in in_phase {
            let _ = writeln!(md, "### {}: {}", f.id, f.title);
            let _ = writeln!(
                md,
                "**Category:** {} | **Complexity:** {}",
                f.category,
                f.complexity.as_str()
            );
            if !f.depends_on.is_empty() {
                let _ = writeln!(md, "**Depends on:** {}", f.depends_on.join(", "));
            }
            md.push('\n');
            for ac in &f.acceptance_criteria {
                let _ = writeln!(md, "- [ ] {}", ac);
            }
            md.push('\n');
        }
    }
    md
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

/// Features rendered when no LLM expansion is available.
fn template_features(input: &HarnessInput) -> Vec<HarnessFeature> {
    fn feature(
        id: String,
        title: String,
        category: &str,
        complexity: Complexity,
        criteria: &[&str],
    ) -> HarnessFeature {
        HarnessFeature {
            id,
            title,
            category: category.to_string(),
            complexity,
            depends_on: Vec::new(),
            acceptance_criteria: criteria.iter().map(|c| c.to_string()).collect(),
        }
    }

    let mut features = vec![
        feature(
            "CONFIG-001".to_string(),
            "Project scaffolding".to_string(),
            "config",
            Complexity::Simple,
            &["Project builds from a clean checkout", "Lint and format checks pass"],
        ),
        feature(
            "CONFIG-002".to_string(),
            "Environment configuration".to_string(),
            "config",
            Complexity::Simple,
            &["Secrets are read from the environment", "Missing configuration fails fast"],
        ),
    ];
    for (i, title) in input.main_features.iter().enumerate() {
        let mut f = feature(
            format!("FEAT-{:03}", i + 1),
            title.clone(),
            "service",
            Complexity::Medium,
            &["Happy path works end to end", "Errors are reported to the user"],
        );
        f.depends_on = vec!["CONFIG-001".to_string()];
        features.push(f);
    }
    features.push(feature(
        "TEST-001".to_string(),
        "End-to-end test suite".to_string(),
        "test",
        Complexity::Medium,
        &["Every main feature has an end-to-end test"],
    ));
    features
}

fn render(input: &HarnessInput, features: &[HarnessFeature]) -> String {
    let stack = &input.tech_stack;
    let mut md = String::new();

    let _ = writeln!(md, "# Harness Build Spec: {}\n", input.project_name);
    let _ = writeln!(md, "**Project type:** {}\n", input.project_type.label());

    let _ = writeln!(md, "## Overview\n");
    let _ = writeln!(md, "**Problem:** {}\n", or_dash(&input.problem_statement));
    let _ = writeln!(md, "**Target audience:** {}\n", or_dash(&input.target_audience));
    let _ = writeln!(md, "**Solution:** {}\n", or_dash(&input.solution));

    let _ = writeln!(md, "## Tech Stack\n");
    let _ = writeln!(md, "| Layer | Choice |\n|---|---|");
    let _ = writeln!(md, "| Backend | {} |", or_dash(&stack.backend));
    let _ = writeln!(md, "| Database | {} |", or_dash(&stack.database));
    let _ = writeln!(md, "| Frontend | {} |", or_dash(&stack.frontend));
    let _ = writeln!(md, "| Auth | {} |", or_dash(&stack.auth));
    let _ = writeln!(md, "| Hosting | {} |", or_dash(&stack.hosting));
    if let Some(payments) = &stack.payments {
        let _ = writeln!(md, "| Payments | {} |", payments);
    }
    if let Some(email) = &stack.email {
        let _ = writeln!(md, "| Email | {} |", email);
    }
    md.push('\n');

    let _ = writeln!(md, "## Main Features\n");
    for f in &input.main_features {
        let _ = writeln!(md, "- {}", f);
    }
    md.push('\n');

    let _ = writeln!(md, "## Constraints\n\n{}\n", or_dash(&input.constraints));
    let _ = writeln!(md, "## Differentiation\n\n{}\n", or_dash(&input.differentiation));
    let _ = writeln!(md, "## Risks\n\n{}\n", or_dash(&input.risks));
    let _ = writeln!(md, "## Next Steps\n\n{}", or_dash(&input.next_steps));

    md.push_str(&features_markdown(features));

    let _ = writeln!(md, "\n---\n\n## Global Acceptance Criteria\n");
    md.push_str("- [ ] All features have passing tests\n");
    md.push_str("- [ ] No secrets are committed to the repository\n");
    md.push_str("- [ ] The app runs from a single documented command\n");
    md
}

fn expansion_prompt(input: &HarnessInput) -> Result<String, HarnessError> {
    let tech_stack = serde_json::to_string_pretty(&input.tech_stack)?;
    Ok(format!(
        r#"Break this project down into implementable features.

Project: {}
Problem: {}
Target audience: {}
Solution: {}
Tech stack:
{}
Main features:
- {}
Constraints: {}
Differentiation: {}
Risks: {}

Respond with a JSON array only. Each element:
{{"id": "DB-001", "title": "...", "category": "config|database|service|security|api|ui|integration|test|worker|infrastructure",
 "complexity": "simple|medium|complex", "dependsOn": ["CONFIG-001"], "acceptanceCriteria": ["..."]}}"#,
        input.project_name,
        input.problem_statement,
        input.target_audience,
        input.solution,
        tech_stack,
        input.main_features.join("\n- "),
        input.constraints,
        input.differentiation,
        input.risks,
    ))
}

/// Template-only spec.
pub fn generate_basic(input: &HarnessInput) -> Result<HarnessSpec, HarnessError> {
    input.validate()?;
    let features = template_features(input);
    Ok(HarnessSpec {
        markdown: render(input, &features),
        stats: calculate_stats(&features),
        features,
        provider: None,
    })
}

/// Spec with LLM-expanded features; falls back to the template when none parse.
pub async fn generate(gateway: &LlmGateway, input: &HarnessInput) -> Result<HarnessSpec, HarnessError> {
    input.validate()?;
    let served = gateway
        .expand_harness_features(&expansion_prompt(input)?)
        .await?;

    let features = parse_features_from_llm(&served.value);
    if features.is_empty() {
        log::warn!("No harness features parsed from {}; using template", served.provider);
        return generate_basic(input);
    }

    log::info!("Generated {} harness features via {}", features.len(), served.provider);
    Ok(HarnessSpec {
        markdown: render(input, &features),
        stats: calculate_stats(&features),
        features,
        provider: Some(served.provider),
    })
}

/// Copy of `idea` carrying the export choices in its `harness_*` fields.
///
/// Persist it through the library's update path.
pub fn with_harness_metadata(
    idea: &NormalizedIdea,
    input: &HarnessInput,
) -> Result<NormalizedIdea, HarnessError> {
    let mut next = idea.clone();
    next.harness_project_type = input.project_type.label().to_string();
    next.harness_tech_stack = serde_json::to_string(&input.tech_stack)?;
    next.harness_features = serde_json::to_string(&input.main_features)?;
    Ok(next)
}

/// `<project-name>-harness-spec.md`
pub fn spec_file_name(project_name: &str) -> String {
    let slug = project_name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .replace(['/', '\\'], "-");
    format!("{}-harness-spec.md", slug)
}

pub fn write_spec(spec: &HarnessSpec, project_name: &str, dir: &Path) -> Result<PathBuf, HarnessError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(spec_file_name(project_name));
    fs::write(&path, &spec.markdown)?;
    log::info!("Wrote harness spec to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idea::IdeationForm;
    use crate::llm::testing::FakeProvider;
    use crate::llm::{GatewayTimeouts, LlmProvider};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn input(features: &[&str]) -> HarnessInput {
        let form = IdeationForm {
            project_name: "Trail Buddy".to_string(),
            problem_statement: "Hiking alone is risky".to_string(),
            ..IdeationForm::new()
        };
        let idea = NormalizedIdea::from_raw_form(&form, "a@example.com");
        HarnessInput::from_idea(
            &idea,
            TechStack {
                backend: "Rust + axum".to_string(),
                database: "PostgreSQL".to_string(),
                ..Default::default()
            },
            features.iter().map(|f| f.to_string()).collect(),
            ProjectType::MobileApp,
        )
    }

    fn gateway(reply: &str) -> LlmGateway {
        LlmGateway::new(
            vec![Arc::new(FakeProvider::replying("gemini", reply)) as Arc<dyn LlmProvider>],
            GatewayTimeouts::default(),
        )
    }

    const FEATURES_REPLY: &str = r#"Here you go:
[
  {"id":"DB-001","title":"Schema","category":"database","complexity":"simple","acceptanceCriteria":["Migrations run"]},
  {"id":"API-001","title":"Routes","category":"api","complexity":"complex","dependsOn":["DB-001"]},
  {"title":"Mystery"}
]
Thanks!"#;

    #[test]
    fn test_parse_features_defaults() {
        let features = parse_features_from_llm(FEATURES_REPLY);
        assert_eq!(features.len(), 3);
        assert_eq!(features[1].depends_on, vec!["DB-001".to_string()]);
        assert_eq!(features[2].id, "UNKNOWN");
        assert_eq!(features[2].category, "config");
        assert_eq!(features[2].complexity, Complexity::Medium);

        assert!(parse_features_from_llm("no json here").is_empty());
        assert!(parse_features_from_llm("[not json]").is_empty());
    }

    #[test]
    fn test_stats() {
        let stats = calculate_stats(&parse_features_from_llm(FEATURES_REPLY));
        assert_eq!(stats.total_features, 3);
        assert_eq!(stats.estimated_turns, 7 + 35 + 15);
        assert_eq!(stats.by_category["database"], 1);
        assert_eq!(stats.by_complexity["medium"], 1);
        // 57 turns * 0.015 = 0.855; x1.5 = 1.2825
        assert_eq!(stats.estimated_cost, "$1-1");
        assert_eq!(calculate_stats(&[]).estimated_cost, "$0");
    }

    #[test]
    fn test_basic_requires_three_features() {
        assert!(matches!(
            generate_basic(&input(&["Maps", " "])),
            Err(HarnessError::TooFewFeatures(1))
        ));
    }

    #[test]
    fn test_basic_template() {
        let spec = generate_basic(&input(&["Maps", "SOS button", "Trip log"])).unwrap();
        assert!(spec.markdown.starts_with("# Harness Build Spec: Trail Buddy"));
        assert!(spec.markdown.contains("**Project type:** Mobile App"));
        assert!(spec.markdown.contains("| Backend | Rust + axum |"));
        assert!(spec.markdown.contains("### FEAT-002: SOS button"));
        assert!(spec.markdown.contains("## Global Acceptance Criteria"));
        assert_eq!(spec.stats.total_features, 6);
        assert!(spec.provider.is_none());
    }

    #[tokio::test]
    async fn test_generate_groups_by_phase() {
        let gw = gateway(FEATURES_REPLY);
        let spec = generate(&gw, &input(&["Maps", "SOS button", "Trip log"])).await.unwrap();
        assert_eq!(spec.provider, Some("gemini"));
        assert_eq!(spec.features.len(), 3);

        let md = &spec.markdown;
        let foundation = md.find("## Phase 1: Foundation").unwrap();
        let database = md.find("## Phase 2: Database").unwrap();
        let api = md.find("## Phase 5: API Endpoints").unwrap();
        assert!(foundation < database && database < api);
        assert!(!md.contains("## Phase 6: Frontend"));
        assert!(md.contains("**Depends on:** DB-001"));
        assert!(md.contains("- [ ] Migrations run"));
    }

    #[tokio::test]
    async fn test_generate_falls_back_to_template() {
        let gw = gateway("I cannot help with that.");
        let spec = generate(&gw, &input(&["Maps", "SOS button", "Trip log"])).await.unwrap();
        assert!(spec.provider.is_none());
        assert!(spec.markdown.contains("### FEAT-001: Maps"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_propagates_gateway_failure() {
        let gw = LlmGateway::new(
            vec![Arc::new(FakeProvider::failing("gemini")) as Arc<dyn LlmProvider>],
            GatewayTimeouts::default(),
        );
        let result = generate(&gw, &input(&["Maps", "SOS button", "Trip log"])).await;
        assert!(matches!(result, Err(HarnessError::Gateway(_))));
    }

    #[test]
    fn test_metadata_fields() {
        let i = input(&["Maps", "SOS button", "Trip log"]);
        let idea = NormalizedIdea::from_raw_form(&IdeationForm::new(), "a@example.com");
        let tagged = with_harness_metadata(&idea, &i).unwrap();
        assert_eq!(tagged.harness_project_type, "Mobile App");
        assert_eq!(tagged.harness_features, r#"["Maps","SOS button","Trip log"]"#);
        let stack: TechStack = serde_json::from_str(&tagged.harness_tech_stack).unwrap();
        assert_eq!(stack, i.tech_stack);
    }

    #[test]
    fn test_project_type_parse_and_file_name() {
        assert_eq!("mobile app".parse::<ProjectType>().unwrap(), ProjectType::MobileApp);
        assert_eq!("saas".parse::<ProjectType>().unwrap(), ProjectType::Saas);
        assert!("desktop".parse::<ProjectType>().is_err());
        assert_eq!(spec_file_name("Trail  Buddy"), "trail-buddy-harness-spec.md");
    }
}
