//! File-kind classification and generation templates
//!
//! Each file a workflow produces is classified from its path, which selects
//! both the generation prompt and the built-in fallback used when governed
//! generation fails for that file.

use coderail_core::ArtifactType;

/// What a workflow file is, derived from its path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Feature,
    StepDefinition,
    TestSpec,
    PageObject,
    Generic,
}

impl FileKind {
    /// Classify a repository-relative path
    pub fn classify(path: &str) -> FileKind {
        let lower = path.to_lowercase();
        if lower.ends_with(".feature") {
            return FileKind::Feature;
        }
        if lower.contains(".steps.") || lower.contains("/steps/") || lower.starts_with("steps/") {
            return FileKind::StepDefinition;
        }
        if lower.contains(".spec.") || lower.contains(".test.") {
            return FileKind::TestSpec;
        }
        if lower.contains("/pages/") || lower.starts_with("pages/") || lower.contains("page") {
            return FileKind::PageObject;
        }
        FileKind::Generic
    }

    /// The artifact type the governor records for this kind
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            FileKind::Feature => ArtifactType::Feature,
            FileKind::StepDefinition => ArtifactType::StepDefinition,
            FileKind::TestSpec | FileKind::Generic => ArtifactType::Test,
            FileKind::PageObject => ArtifactType::PageObject,
        }
    }
}

/// Generation prompt for one workflow file
pub fn prompt_for(kind: FileKind, path: &str, description: &str) -> String {
    let instructions = match kind {
        FileKind::Feature => {
            "Write a Gherkin feature file with a Feature line and at least one \
             Scenario with Given/When/Then steps."
        }
        FileKind::StepDefinition => {
            "Write Playwright step definitions in TypeScript binding the Gherkin \
             steps to page interactions."
        }
        FileKind::TestSpec => {
            "Write a Playwright test spec in TypeScript using test() and expect()."
        }
        FileKind::PageObject => {
            "Write a TypeScript page object class with locators and action methods."
        }
        FileKind::Generic => "Write the file content in full.",
    };
    format!(
        "{instructions}\nTarget file: {path}\nFeature under development: {description}\n\
         Output only the file content, no commentary."
    )
}

/// Built-in content used when governed generation fails for a file. Always
/// valid, always compilable or parseable by its consumer, never empty.
pub fn fallback_template(kind: FileKind, path: &str, description: &str) -> String {
    let stem = std::path::Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("feature")
        .split('.')
        .next()
        .unwrap_or("feature")
        .to_string();

    match kind {
        FileKind::Feature => format!(
            "Feature: {stem}\n  As a user\n  I want {description}\n\n  \
             Scenario: {stem} happy path\n    Given the application is open\n    \
             When the user completes the {stem} flow\n    Then the outcome is confirmed\n"
        ),
        FileKind::StepDefinition => format!(
            "import {{ Given, When, Then }} from '@cucumber/cucumber';\n\n\
             Given('the application is open', async function () {{\n  \
             await this.page.goto('/');\n}});\n\n\
             When('the user completes the {stem} flow', async function () {{\n  \
             // TODO: drive the {stem} flow once the page objects land\n}});\n\n\
             Then('the outcome is confirmed', async function () {{\n  \
             // TODO: assert the {stem} outcome once the page objects land\n}});\n"
        ),
        FileKind::TestSpec => format!(
            "import {{ test, expect }} from '@playwright/test';\n\n\
             test('{stem}', async ({{ page }}) => {{\n  \
             await page.goto('/');\n  \
             await expect(page).toHaveTitle(/.+/);\n}});\n"
        ),
        FileKind::PageObject => format!(
            "import {{ Page }} from '@playwright/test';\n\n\
             export class {stem}Page {{\n  \
             constructor(private readonly page: Page) {{}}\n\n  \
             async open(): Promise<void> {{\n    await this.page.goto('/');\n  }}\n}}\n"
        ),
        FileKind::Generic => format!("// {path}\n// {description}\n"),
    }
}
