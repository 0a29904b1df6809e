//! The fixed, ordered sequence of workflow steps.
//!
//! A catalog holds the entry sentinel, the real steps in order, and the
//! terminal sentinel. It is built once and never mutated.

use std::collections::{HashMap, HashSet};

use crate::ai::strip_code_fences;

/// Entry sentinel: credential and project description are collected here.
pub const ENTRY_STEP: &str = "api_input";

/// Terminal sentinel: reached after the last real step is approved.
pub const TERMINAL_STEP: &str = "completion";

/// Placeholder substituted with the project description in templates.
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// Placeholder substituted with the source step's content in derived prompts.
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// Catalog construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog has no steps")]
    Empty,

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Step id is reserved for a sentinel: {0}")]
    ReservedId(String),

    #[error("Step '{step}' derives from '{from}', which is not an earlier step")]
    InvalidSource { step: String, from: String },
}

/// Shape of a step's generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    /// Markdown prose, rendered by the presentation layer
    Markdown,
    /// A raw HTML document; surrounding code fences are stripped
    Html,
}

impl ContentFormat {
    /// Normalize generated text before it is accepted as content.
    pub fn normalize(self, text: &str) -> String {
        match self {
            Self::Markdown => text.to_string(),
            Self::Html => strip_code_fences(text),
        }
    }

    /// File extension used when exporting a single step.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Html => "html",
        }
    }

    /// MIME type used when exporting a single step.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
        }
    }

    /// Output instruction given to the generation API.
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Markdown => "The response should be in Markdown format.",
            Self::Html => {
                "Provide only the raw HTML code without any markdown code blocks, backticks, or formatting markers."
            }
        }
    }
}

/// Where a step's generation prompt comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    /// A template containing `{prompt}`.
    Template(String),
    /// A prompt synthesized from an earlier step's content.
    Derived {
        /// Step whose content feeds the prompt
        from: String,
        /// Prompt text with `{prompt}` and `{source}` placeholders
        instructions: String,
        /// Content stored instead of generating when the source is empty
        placeholder: String,
    },
}

/// Replace the first occurrence of each placeholder in `template`.
///
/// Placeholders are located in the template itself, so substituted values
/// are never scanned for further placeholders.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut spans: Vec<(usize, &str, &str)> = values
        .iter()
        .filter_map(|&(placeholder, value)| template.find(placeholder).map(|at| (at, placeholder, value)))
        .collect();
    spans.sort_by_key(|&(at, ..)| at);

    let mut out = String::with_capacity(template.len());
    let mut rest = 0;
    for (at, placeholder, value) in spans {
        if at < rest {
            continue;
        }
        out.push_str(&template[rest..at]);
        out.push_str(value);
        rest = at + placeholder.len();
    }
    out.push_str(&template[rest..]);
    out
}

/// A prompt resolved for one generation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedPrompt {
    /// Send this prompt to the generation API.
    Generate(String),
    /// Do not call the API; store this notice as the step's content.
    Placeholder(String),
}

impl PromptSource {
    /// Resolve the prompt against the project description and current content.
    pub fn render(&self, project_prompt: &str, content: &HashMap<String, String>) -> RenderedPrompt {
        match self {
            Self::Template(template) => {
                RenderedPrompt::Generate(fill(template, &[(PROMPT_PLACEHOLDER, project_prompt)]))
            }
            Self::Derived { from, instructions, placeholder } => {
                match content.get(from).filter(|c| !c.trim().is_empty()) {
                    Some(source) => RenderedPrompt::Generate(fill(
                        instructions,
                        &[(PROMPT_PLACEHOLDER, project_prompt), (SOURCE_PLACEHOLDER, source)],
                    )),
                    None => RenderedPrompt::Placeholder(placeholder.clone()),
                }
            }
        }
    }

    /// Step this source depends on, if any.
    pub fn depends_on(&self) -> Option<&str> {
        match self {
            Self::Template(_) => None,
            Self::Derived { from, .. } => Some(from),
        }
    }
}

/// Immutable definition of one workflow step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: String,
    pub label: String,
    /// `None` for the two sentinels
    pub source: Option<PromptSource>,
    pub format: ContentFormat,
    /// Whether users may overwrite the content directly
    pub editable: bool,
    /// Position in the sequence; the entry sentinel is 0
    pub ordinal: usize,
}

impl Step {
    /// A step generated from a `{prompt}` template.
    pub fn templated(
        id: impl Into<String>,
        label: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self::with_source(id, label, Some(PromptSource::Template(template.into())))
    }

    /// A step whose prompt is synthesized from an earlier step's content.
    pub fn derived(
        id: impl Into<String>,
        label: impl Into<String>,
        from: impl Into<String>,
        instructions: impl Into<String>,
        placeholder: impl Into<String>,
    ) -> Self {
        Self::with_source(
            id,
            label,
            Some(PromptSource::Derived {
                from: from.into(),
                instructions: instructions.into(),
                placeholder: placeholder.into(),
            }),
        )
    }

    fn sentinel(id: &str, label: &str) -> Self {
        Self::with_source(id, label, None)
    }

    fn with_source(
        id: impl Into<String>,
        label: impl Into<String>,
        source: Option<PromptSource>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            source,
            format: ContentFormat::Markdown,
            editable: false,
            ordinal: 0,
        }
    }

    /// Set the content format.
    pub fn format(mut self, format: ContentFormat) -> Self {
        self.format = format;
        self
    }

    /// Allow direct user edits of the content.
    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    /// Whether this is the entry or terminal sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.source.is_none()
    }
}

/// Ordered workflow definition.
#[derive(Debug, Clone)]
pub struct StepCatalog {
    entry: Step,
    steps: Vec<Step>,
    terminal: Step,
}

impl Default for StepCatalog {
    fn default() -> Self {
        Self::sdlc()
    }
}

impl StepCatalog {
    /// Build a catalog from real steps in order.
    pub fn new(steps: Vec<Step>) -> Result<Self, CatalogError> {
        if steps.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if Self::is_sentinel(&step.id) {
                return Err(CatalogError::ReservedId(step.id.clone()));
            }
            if let Some(from) = step.source.as_ref().and_then(|s| s.depends_on()) {
                if !seen.contains(from) {
                    return Err(CatalogError::InvalidSource {
                        step: step.id.clone(),
                        from: from.to_string(),
                    });
                }
            }
            if !seen.insert(step.id.clone()) {
                return Err(CatalogError::DuplicateStep(step.id.clone()));
            }
        }

        Ok(Self::assemble(steps))
    }

    fn assemble(mut steps: Vec<Step>) -> Self {
        for (index, step) in steps.iter_mut().enumerate() {
            step.ordinal = index + 1;
        }
        let mut terminal = Step::sentinel(TERMINAL_STEP, "Completed");
        terminal.ordinal = steps.len() + 1;

        Self { entry: Step::sentinel(ENTRY_STEP, "Getting Started"), steps, terminal }
    }

    /// The software-development-lifecycle workflow.
    pub fn sdlc() -> Self {
        let steps = vec![
            Step::templated("user_stories", "User Stories", USER_STORIES_TEMPLATE),
            Step::templated("design_docs", "Design Docs", DESIGN_DOCS_TEMPLATE),
            Step::templated("code_generation", "Code Generation", CODE_GENERATION_TEMPLATE)
                .format(ContentFormat::Html)
                .editable(),
            Step::derived(
                "code_review",
                "Code Review",
                "code_generation",
                CODE_REVIEW_INSTRUCTIONS,
                CODE_REVIEW_PLACEHOLDER,
            ),
            Step::templated("test_cases", "Test Cases", TEST_CASES_TEMPLATE),
            Step::templated("deployment", "Deployment Plan", DEPLOYMENT_TEMPLATE),
        ];

        Self::assemble(steps)
    }

    /// The entry sentinel.
    pub fn entry(&self) -> &Step {
        &self.entry
    }

    /// The first real step.
    pub fn first(&self) -> &Step {
        &self.steps[0]
    }

    /// Real steps in order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Entry sentinel, real steps, terminal sentinel.
    pub fn all(&self) -> impl Iterator<Item = &Step> {
        std::iter::once(&self.entry).chain(self.steps.iter()).chain(std::iter::once(&self.terminal))
    }

    /// Number of real steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Look up any step, sentinels included.
    pub fn get(&self, id: &str) -> Option<&Step> {
        self.all().find(|s| s.id == id)
    }

    /// Look up a real step.
    pub fn real_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Whether `id` names a step or sentinel.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Whether `id` is one of the sentinels.
    pub fn is_sentinel(id: &str) -> bool {
        id == ENTRY_STEP || id == TERMINAL_STEP
    }

    /// Position of a step in the sequence.
    pub fn ordinal(&self, id: &str) -> Option<usize> {
        self.get(id).map(|s| s.ordinal)
    }

    /// Display label, falling back to the id.
    pub fn label<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map_or(id, |s| s.label.as_str())
    }

    /// Step that follows `id` on approval: the next real step, or the terminal sentinel.
    pub fn next_after(&self, id: &str) -> Option<&Step> {
        if id == ENTRY_STEP {
            return Some(self.first());
        }
        let index = self.steps.iter().position(|s| s.id == id)?;
        Some(self.steps.get(index + 1).unwrap_or(&self.terminal))
    }
}

const USER_STORIES_TEMPLATE: &str = "Generate a comprehensive and detailed set of user stories for a project described as: '{prompt}'. For each user story, include a title, user role, goal, and detailed acceptance criteria following the 'Given-When-Then' format. Group stories by epic or feature where applicable.";

const DESIGN_DOCS_TEMPLATE: &str = "Create a functional and technical design document for: '{prompt}'. The functional section should include user flows and detailed feature specifications. The technical section should propose a system architecture, recommend a technology stack, and define the data models with fields and relationships.";

const CODE_GENERATION_TEMPLATE: &str = "Generate a complete, fully functional HTML prototype/application for: '{prompt}'. Create a comprehensive single-file HTML document that includes: 1) **Complete HTML Structure** - All necessary semantic HTML elements, forms, navigation, content sections. 2) **Advanced Styling** - Beautiful responsive design using Tailwind CSS classes (loaded from CDN), custom CSS for animations, gradients, and modern UI patterns. 3) **Functional JavaScript** - Interactive features, form handling, data management, local storage integration, API simulation, dynamic content updates, event handlers, and user interactions. 4) **Modern Features** - Progressive enhancement, accessibility features, responsive design, smooth animations, loading states, error handling. 5) **Working Prototype** - All buttons, forms, navigation, and interactive elements should be fully functional with realistic data and workflows. Provide only the raw HTML code without any markdown formatting. Return the complete HTML document starting with <!DOCTYPE html> and ending with </html>.";

const CODE_REVIEW_INSTRUCTIONS: &str = r"Act as a senior software engineer and perform a thorough code review on the following generated code:

PROJECT CONTEXT: {prompt}

GENERATED CODE TO REVIEW:
```html
{source}
```

Please provide a comprehensive code review covering:
1. **Code Quality**: Structure, readability, maintainability
2. **Security**: Potential vulnerabilities and security best practices
3. **Performance**: Optimization opportunities and performance considerations
4. **Best Practices**: Adherence to modern web development standards
5. **Functionality**: Logic review and potential bugs
6. **Accessibility**: WCAG compliance and accessibility improvements
7. **Recommendations**: Specific suggestions for improvement

Format your response with clear sections and actionable feedback.";

const CODE_REVIEW_PLACEHOLDER: &str =
    "⚠️ No code available for review. Please generate code in the \"Code Generation\" step first.";

const TEST_CASES_TEMPLATE: &str = "Create a detailed set of test cases for the project: '{prompt}'. Include a mix of unit tests, integration tests, and end-to-end tests. For each test case, provide a test ID, a description, steps to reproduce, expected results, and define if it's a positive or negative test.";

const DEPLOYMENT_TEMPLATE: &str = "Create a detailed, step-by-step deployment plan for the application: '{prompt}'. The plan should cover pre-deployment checks, environment setup, deployment strategy (e.g., blue-green), the deployment process itself, and a comprehensive rollback strategy in case of failure.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdlc_order_and_ordinals() {
        let catalog = StepCatalog::sdlc();
        let ids: Vec<_> = catalog.all().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                ENTRY_STEP,
                "user_stories",
                "design_docs",
                "code_generation",
                "code_review",
                "test_cases",
                "deployment",
                TERMINAL_STEP,
            ]
        );
        assert_eq!(catalog.ordinal(ENTRY_STEP), Some(0));
        assert_eq!(catalog.ordinal("user_stories"), Some(1));
        assert_eq!(catalog.ordinal(TERMINAL_STEP), Some(7));
        assert_eq!(catalog.len(), 6);
    }

    #[test]
    fn test_next_after() {
        let catalog = StepCatalog::sdlc();
        assert_eq!(catalog.next_after(ENTRY_STEP).map(|s| s.id.as_str()), Some("user_stories"));
        assert_eq!(catalog.next_after("user_stories").map(|s| s.id.as_str()), Some("design_docs"));
        assert_eq!(catalog.next_after("deployment").map(|s| s.id.as_str()), Some(TERMINAL_STEP));
        assert!(catalog.next_after(TERMINAL_STEP).is_none());
        assert!(catalog.next_after("nope").is_none());
    }

    #[test]
    fn test_code_generation_is_editable_html() {
        let catalog = StepCatalog::sdlc();
        let step = catalog.real_step("code_generation").unwrap();
        assert!(step.editable);
        assert_eq!(step.format, ContentFormat::Html);
        assert!(!catalog.real_step("design_docs").unwrap().editable);
    }

    #[test]
    fn test_template_render() {
        let source = PromptSource::Template("Stories for '{prompt}'.".to_string());
        let rendered = source.render("a todo app", &HashMap::new());
        assert_eq!(rendered, RenderedPrompt::Generate("Stories for 'a todo app'.".to_string()));
    }

    #[test]
    fn test_derived_render_uses_source_content() {
        let catalog = StepCatalog::sdlc();
        let review = catalog.real_step("code_review").unwrap();
        let source = review.source.as_ref().unwrap();

        let mut content = HashMap::new();
        content.insert("code_generation".to_string(), "<html>app</html>".to_string());

        match source.render("a todo app", &content) {
            RenderedPrompt::Generate(prompt) => {
                assert!(prompt.contains("PROJECT CONTEXT: a todo app"));
                assert!(prompt.contains("```html\n<html>app</html>\n```"));
            }
            other => panic!("expected prompt, got {other:?}"),
        }
    }

    #[test]
    fn test_render_does_not_expand_placeholders_in_values() {
        let catalog = StepCatalog::sdlc();
        let review = catalog.real_step("code_review").unwrap();
        let content = HashMap::from([("code_generation".to_string(), "<p>{prompt}</p>".to_string())]);

        let source = review.source.as_ref().unwrap();

        match source.render("Todo app, see {source}", &content) {
            RenderedPrompt::Generate(prompt) => {
                assert!(prompt.contains("PROJECT CONTEXT: Todo app, see {source}"));
                assert!(prompt.contains("```html\n<p>{prompt}</p>\n```"));
                assert_eq!(prompt.matches("<p>").count(), 1);
            }
            other => panic!("expected prompt, got {other:?}"),
        }
    }

    #[test]
    fn test_derived_render_placeholder_without_source() {
        let catalog = StepCatalog::sdlc();
        let source = catalog.real_step("code_review").unwrap().source.clone().unwrap();

        let mut content = HashMap::new();
        content.insert("code_generation".to_string(), "  ".to_string());

        match source.render("a todo app", &content) {
            RenderedPrompt::Placeholder(notice) => assert!(notice.contains("No code available")),
            other => panic!("expected placeholder, got {other:?}"),
        }
    }

    #[test]
    fn test_catalog_rejects_bad_definitions() {
        assert_eq!(StepCatalog::new(Vec::new()).unwrap_err(), CatalogError::Empty);

        let dup = vec![Step::templated("a", "A", "{prompt}"), Step::templated("a", "A2", "{prompt}")];
        assert_eq!(StepCatalog::new(dup).unwrap_err(), CatalogError::DuplicateStep("a".into()));

        let reserved = vec![Step::templated(ENTRY_STEP, "Entry", "{prompt}")];
        assert!(matches!(StepCatalog::new(reserved), Err(CatalogError::ReservedId(_))));

        let forward = vec![
            Step::derived("review", "Review", "code", "{source}", "none"),
            Step::templated("code", "Code", "{prompt}"),
        ];
        assert!(matches!(StepCatalog::new(forward), Err(CatalogError::InvalidSource { .. })));
    }

    #[test]
    fn test_labels_and_sentinels() {
        let catalog = StepCatalog::sdlc();
        assert_eq!(catalog.label("deployment"), "Deployment Plan");
        assert_eq!(catalog.label(ENTRY_STEP), "Getting Started");
        assert_eq!(catalog.label("unknown"), "unknown");
        assert!(StepCatalog::is_sentinel(TERMINAL_STEP));
        assert!(catalog.entry().is_sentinel());
        assert!(!catalog.first().is_sentinel());
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(ContentFormat::Html.extension(), "html");
        assert_eq!(ContentFormat::Markdown.mime_type(), "text/markdown");
        assert_eq!(ContentFormat::Html.normalize("```html\n<p>x</p>\n```"), "<p>x</p>");
        assert_eq!(ContentFormat::Markdown.normalize("```\ncode\n```"), "```\ncode\n```");
    }
}
