use crate::problem::{Problem, ProblemKey, ProblemLevel};

struct SeedSection {
    id: u32,
    title: &'static str,
    first: u32,
    last: u32,
}

struct SeedChapter {
    id: u32,
    title: &'static str,
    /// Problems `1..=basic_end` are basic, `..=standard_end` standard, the rest advanced.
    basic_end: u32,
    standard_end: u32,
    sections: &'static [SeedSection],
}

const CHAPTERS: &[SeedChapter] = &[
    SeedChapter {
        id: 1,
        title: "Sets and Functions",
        basic_end: 12,
        standard_end: 24,
        sections: &[
            SeedSection { id: 1, title: "Sets and Propositions", first: 1, last: 9 },
            SeedSection { id: 2, title: "Functions", first: 10, last: 18 },
            SeedSection { id: 3, title: "Sequences", first: 19, last: 27 },
            SeedSection { id: 4, title: "Limits", first: 28, last: 36 },
        ],
    },
    SeedChapter {
        id: 2,
        title: "Differential Calculus",
        basic_end: 10,
        standard_end: 22,
        sections: &[
            SeedSection { id: 1, title: "Derivatives", first: 1, last: 10 },
            SeedSection { id: 2, title: "Rates of Change", first: 11, last: 20 },
            SeedSection { id: 3, title: "Optimization", first: 21, last: 30 },
        ],
    },
    SeedChapter {
        id: 3,
        title: "Integral Calculus",
        basic_end: 10,
        standard_end: 20,
        sections: &[
            SeedSection { id: 1, title: "Antiderivatives", first: 1, last: 7 },
            SeedSection { id: 2, title: "Definite Integrals", first: 8, last: 14 },
            SeedSection { id: 3, title: "Area Between Curves", first: 15, last: 21 },
            SeedSection { id: 4, title: "Volumes of Revolution", first: 22, last: 28 },
        ],
    },
];

/// The built-in problem set, in chapter, section, problem order.
pub fn seed_problems() -> Vec<Problem> {
    let mut problems = Vec::new();
    for chapter in CHAPTERS {
        for section in chapter.sections {
            for problem_id in section.first..=section.last {
                let level = if problem_id <= chapter.basic_end {
                    ProblemLevel::Basic
                } else if problem_id <= chapter.standard_end {
                    ProblemLevel::Standard
                } else {
                    ProblemLevel::Advanced
                };
                problems.push(Problem::new(
                    ProblemKey::new(chapter.id, section.id, problem_id),
                    chapter.title,
                    section.title,
                    level,
                ));
            }
        }
    }
    problems
}
