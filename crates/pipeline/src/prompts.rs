//! Prompt assembly.
//!
//! Every prompt lists upstream entities with their zero-based index so the
//! model can reference them (`addressedPainPoints`, `relatedSolutionIndices`)
//! before any of the new rows has an id. Locked rows are listed as already
//! decided so they are not duplicated.

use std::collections::HashMap;
use std::fmt::Write as _;

use goldi_storage::{PainPointRecord, PersonaRecord, SolutionRecord, UserStoryRecord};

use crate::candidates::{ScreenCandidate, SchemaCandidate, TechStackCandidate};

/// A system and a user message.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const JSON_ONLY: &str = "Respond only with valid JSON. Do not include markdown fences or other text.";

fn system(role: &str) -> String {
    format!("{role}\n\n{JSON_ONLY}")
}

fn already_decided<'a>(out: &mut String, label: &str, titles: impl Iterator<Item = &'a str>) {
    let titles: Vec<&str> = titles.collect();
    if titles.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nAlready decided {label} (do not duplicate):");
    for t in titles {
        let _ = writeln!(out, "- {t}");
    }
}

pub fn problem_validation(problem_input: &str) -> Prompt {
    Prompt {
        system: system("You are a problem analyst. Judge whether the input describes a concrete, solvable problem."),
        user: format!(
            "Analyze: \"{problem_input}\"\n\n\
             Respond with: {{\"isValid\": boolean, \"feedback\": \"string\", \
             \"keyTerms\": [\"term\"], \"refinedProblem\": \"string\"}}"
        ),
    }
}

pub fn personas(problem: &str, locked: &[PersonaRecord], n: usize) -> Prompt {
    let mut user = format!("Core problem: {problem}\n");
    already_decided(
        &mut user,
        "personas",
        locked.iter().map(|p| p.name.as_str()),
    );
    let _ = write!(
        user,
        "\nGenerate {n} new personas who face this problem, spread across industries and roles.\n\
         Return as JSON: {{\"personas\": [{{\"name\": \"...\", \"industry\": \"...\", \"role\": \"...\", \
         \"painDegree\": 1-5, \"description\": \"...\"}}]}}"
    );
    Prompt {
        system: system("You are a user researcher identifying the people a problem affects."),
        user,
    }
}

pub fn persona_diversity(problem: &str, locked: &[PersonaRecord], n: usize) -> Prompt {
    let mut prompt = personas(problem, locked, n);
    prompt.user.push_str(
        "\n\nThe previous set lacked variety. Use at least three different industries \
         and four different roles across all personas.",
    );
    prompt
}

pub fn pain_points(
    problem: &str,
    persona: &PersonaRecord,
    locked: &[PainPointRecord],
    n: usize,
) -> Prompt {
    let mut user = format!(
        "Core problem: {problem}\nPersona: {} ({}, {}), pain degree {}/5. {}\n",
        persona.name, persona.role, persona.industry, persona.pain_degree, persona.description
    );
    already_decided(
        &mut user,
        "pain points",
        locked.iter().map(|p| p.description.as_str()),
    );
    let _ = write!(
        user,
        "\nGenerate {n} specific pain points this persona experiences.\n\
         Return as JSON: {{\"painPoints\": [{{\"description\": \"...\", \
         \"severity\": \"Critical|High|Medium\", \"impactArea\": \"...\"}}]}}"
    );
    Prompt {
        system: system("You are a user researcher describing concrete, specific pain points."),
        user,
    }
}

pub fn solutions(
    problem: &str,
    persona: &PersonaRecord,
    pain_points: &[PainPointRecord],
    locked: &[SolutionRecord],
    n: usize,
) -> Prompt {
    let mut user = format!(
        "Core problem: {problem}\nPersona: {} ({}, {})\n\nPain points:\n",
        persona.name, persona.role, persona.industry
    );
    for (i, p) in pain_points.iter().enumerate() {
        let _ = writeln!(user, "{i}. [{}] {}", p.severity, p.description);
    }
    already_decided(&mut user, "solutions", locked.iter().map(|s| s.title.as_str()));
    let _ = write!(
        user,
        "\nGenerate {n} software solutions.\n\
         Return as JSON: {{\"solutions\": [{{\"title\": \"...\", \"description\": \"...\", \
         \"solutionType\": \"Feature|Integration|Automation|Analytics|Platform\", \
         \"complexity\": \"Low|Medium|High\", \"addressedPainPoints\": [0]}}]}}\n\
         addressedPainPoints are indices into the pain point list above."
    );
    Prompt {
        system: system("You are a product strategist turning pain points into software solutions."),
        user,
    }
}

/// One extra solution for pain points no generated solution addresses.
pub fn solution_coverage(
    problem: &str,
    persona: &PersonaRecord,
    gaps: &[&PainPointRecord],
    existing: &[&str],
) -> Prompt {
    let mut user = format!(
        "Core problem: {problem}\nPersona: {} ({}, {})\n\nNo solution addresses these pain points yet:\n",
        persona.name, persona.role, persona.industry
    );
    for p in gaps {
        let _ = writeln!(user, "- [{}] {}", p.severity, p.description);
    }
    already_decided(&mut user, "solutions", existing.iter().copied());
    let _ = write!(
        user,
        "\nGenerate 1 software solution that addresses all of them.\n\
         Return as JSON: {{\"solutions\": [{{\"title\": \"...\", \"description\": \"...\", \
         \"solutionType\": \"Feature|Integration|Automation|Analytics|Platform\", \
         \"complexity\": \"Low|Medium|High\", \"addressedPainPoints\": []}}]}}"
    );
    Prompt {
        system: system("You are a product strategist closing gaps in a solution set."),
        user,
    }
}

fn story_shape() -> &'static str {
    "Return as JSON: {\"userStories\": [{\"title\": \"...\", \"asA\": \"...\", \"iWant\": \"...\", \
     \"soThat\": \"...\", \"acceptanceCriteria\": [\"...\"], \"priority\": \"High|Medium|Low\", \
     \"complexityPoints\": 1-13, \"relatedSolutionIndices\": [0]}]}\n\
     relatedSolutionIndices are indices into the solution list above."
}

fn list_solutions(out: &mut String, solutions: &[&SolutionRecord]) {
    for (i, s) in solutions.iter().enumerate() {
        let _ = writeln!(out, "{i}. {}: {}", s.title, s.description);
    }
}

pub fn user_stories(
    problem: &str,
    persona: Option<&PersonaRecord>,
    solutions: &[SolutionRecord],
    pain_points_by_solution: &HashMap<String, Vec<PainPointRecord>>,
    preserved: &[UserStoryRecord],
    n: usize,
) -> Prompt {
    let mut user = format!("Core problem: {problem}\n");
    if let Some(p) = persona {
        let _ = writeln!(user, "Primary persona: {} ({}, {})", p.name, p.role, p.industry);
    }
    user.push_str("\nSelected solutions:\n");
    for (i, s) in solutions.iter().enumerate() {
        let _ = writeln!(user, "{i}. {}: {}", s.title, s.description);
        for pp in pain_points_by_solution.get(&s.id).into_iter().flatten() {
            let _ = writeln!(user, "   addresses: {}", pp.description);
        }
    }
    already_decided(
        &mut user,
        "user stories",
        preserved.iter().map(|s| s.title.as_str()),
    );
    let _ = write!(
        user,
        "\nGenerate {n} user stories that together implement every selected solution.\n{}",
        story_shape()
    );
    Prompt {
        system: system("You are a product owner writing implementable user stories."),
        user,
    }
}

/// Supplemental stories for solutions no story covers yet. Indices in the
/// answer refer to the gap list shown here.
pub fn user_story_coverage(problem: &str, gaps: &[&SolutionRecord], n: usize) -> Prompt {
    let mut user = format!("Core problem: {problem}\n\nThese solutions have no user story yet:\n");
    list_solutions(&mut user, gaps);
    let _ = write!(
        user,
        "\nGenerate {n} additional user stories covering them.\n{}",
        story_shape()
    );
    Prompt {
        system: system("You are a product owner filling gaps in a backlog."),
        user,
    }
}

pub fn data_flow(title: &str, as_a: &str, i_want: &str, so_that: &str) -> Prompt {
    Prompt {
        system: system("You are a systems analyst tracing how data moves through an application."),
        user: format!(
            "User story: {title}\nAs {as_a}, I want {i_want}, so that {so_that}.\n\n\
             Describe the data flow that implements it.\n\
             Return as JSON: {{\"description\": \"...\", \"steps\": [{{\"stepNumber\": 1, \
             \"actor\": \"...\", \"action\": \"...\", \"source\": \"...\", \"target\": \"...\", \
             \"dataPayload\": \"...\"}}]}}"
        ),
    }
}

pub fn tech_stack(problem: &str, stories: &[UserStoryRecord], solutions: &[SolutionRecord]) -> Prompt {
    let mut user = format!("Core problem: {problem}\n\nSolutions:\n");
    for s in solutions {
        let _ = writeln!(user, "- {} ({})", s.title, s.solution_type);
    }
    user.push_str("\nUser stories:\n");
    for s in stories {
        let _ = writeln!(user, "- {}: As {}, I want {}", s.title, s.as_a, s.i_want);
    }
    user.push_str(
        "\nRecommend a technology stack.\n\
         Return as JSON: {\"techStack\": [{\"layer\": \"Frontend|Backend|Database|DevOps|Testing\", \
         \"technology\": \"...\", \"justification\": \"...\"}]}",
    );
    Prompt {
        system: system("You are a software architect choosing a pragmatic stack."),
        user,
    }
}

pub fn database_schema(stories: &[UserStoryRecord], stack: &[TechStackCandidate]) -> Prompt {
    let mut user = String::from("User stories:\n");
    for s in stories {
        let _ = writeln!(user, "- {}: As {}, I want {}", s.title, s.as_a, s.i_want);
    }
    user.push_str("\nTechnology stack:\n");
    for t in stack {
        let _ = writeln!(user, "- {}: {}", t.layer, t.technology);
    }
    user.push_str(
        "\nDesign a normalized relational schema.\n\
         Return as JSON: {\"tables\": [{\"tableName\": \"...\", \"columns\": [{\"columnName\": \"id\", \
         \"dataType\": \"UUID\", \"isPrimaryKey\": true, \"isForeignKey\": false, \
         \"referencesTable\": null, \"constraints\": [\"NOT NULL\"]}]}], \
         \"relationships\": [{\"fromTable\": \"...\", \"toTable\": \"...\", \
         \"relationshipType\": \"one-to-many\"}]}",
    );
    Prompt {
        system: system("You are a database architect expert in data modeling."),
        user,
    }
}

pub fn ui_screens(
    stories: &[UserStoryRecord],
    stack: &[TechStackCandidate],
    schema: &SchemaCandidate,
) -> Prompt {
    let mut user = String::from("User stories:\n");
    for s in stories {
        let _ = writeln!(user, "- {}: I want {}", s.title, s.i_want);
    }
    let frontend: Vec<&str> = stack
        .iter()
        .filter(|t| t.layer.eq_ignore_ascii_case("frontend"))
        .map(|t| t.technology.as_str())
        .collect();
    if !frontend.is_empty() {
        let _ = writeln!(user, "\nFrontend: {}", frontend.join(", "));
    }
    let tables: Vec<&str> = schema.tables.iter().map(|t| t.table_name.as_str()).collect();
    let _ = writeln!(user, "Data model tables: {}", tables.join(", "));
    user.push_str(
        "\nDesign the UI screens.\n\
         Return as JSON: {\"screens\": [{\"screenName\": \"...\", \"description\": \"...\", \
         \"routePath\": \"/...\", \"components\": [{\"componentName\": \"...\", \
         \"componentType\": \"atom|molecule|organism\", \"dataDisplayed\": \"...\", \"props\": {}}]}]}",
    );
    Prompt {
        system: system("You are a UI/UX architect designing screens from user stories."),
        user,
    }
}

pub fn design_system(screens: &[ScreenCandidate]) -> Prompt {
    let mut user = String::from("Screens:\n");
    for s in screens {
        let components: Vec<&str> = s
            .components
            .iter()
            .map(|c| c.component_name.as_str())
            .collect();
        let _ = writeln!(user, "- {} ({}): {}", s.screen_name, s.route_path, components.join(", "));
    }
    user.push_str(
        "\nDefine design tokens and an atomic component library for these screens.\n\
         Return as JSON: {\"designTokens\": [{\"category\": \"color|typography|spacing|shadow\", \
         \"tokenName\": \"...\", \"tokenValue\": \"...\"}], \"atomicComponents\": \
         [{\"componentLevel\": \"atom|molecule|organism\", \"componentName\": \"...\", \
         \"description\": \"...\", \"props\": {}, \"composedOf\": []}]}",
    );
    Prompt {
        system: system("You are a design-system engineer."),
        user,
    }
}
