use crate::models::{SearchResult, UserContextSummary};
use crate::safety::is_diet_related;

/// Numbered context block assembled from retrieved passages, referenced
/// from answers as `[#N]`.
pub fn build_context_block(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(index, result)| {
            let heading = result
                .title
                .as_deref()
                .map(|title| format!("({title})"))
                .unwrap_or_default();
            format!("[#{}] {}\n{}", index + 1, heading, result.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_user_context_block(summary: Option<&UserContextSummary>) -> String {
    let Some(summary) = summary else {
        return "No user context available.".to_string();
    };
    if summary.profile.is_none() && summary.plan.is_none() {
        return "No user context available.".to_string();
    }

    let mut lines = Vec::new();
    if let Some(profile) = &summary.profile {
        let fields = [
            profile.gender.as_ref().map(|value| format!("gender={value}")),
            profile.age.map(|value| format!("age={value}")),
            profile.height_cm.map(|value| format!("heightCm={value}")),
            profile
                .current_weight_kg
                .map(|value| format!("weightKg={value}")),
            profile.bmi_current.map(|value| format!("bmi={value}")),
            profile
                .activity_level
                .as_ref()
                .map(|value| format!("activity={value}")),
            profile
                .diet_goal
                .as_ref()
                .map(|value| format!("goal={value}")),
        ];
        lines.push(join_fields("Profile:", fields));
    }
    if let Some(plan) = &summary.plan {
        let fields = [
            plan.daily_calorie_target
                .map(|value| format!("calories={value}")),
            plan.protein_target.map(|value| format!("protein={value}g")),
            plan.carbs_target.map(|value| format!("carbs={value}g")),
            plan.fat_target.map(|value| format!("fat={value}g")),
            plan.target_weight
                .map(|value| format!("targetWeight={value}kg")),
            plan.target_bmi.map(|value| format!("targetBmi={value}")),
            plan.plan_type
                .as_ref()
                .map(|value| format!("planType={value}")),
        ];
        lines.push(join_fields("Plan:", fields));
    }
    let recent_fields = [
        summary
            .recent
            .latest_weight_kg
            .map(|value| format!("latestWeight={value}kg")),
        summary
            .recent
            .avg_calories_7d
            .map(|value| format!("avgCalories7d={value}")),
    ];
    if recent_fields.iter().any(Option::is_some) {
        lines.push(join_fields("Recent:", recent_fields));
    }

    lines.join("\n")
}

fn join_fields<const N: usize>(label: &str, fields: [Option<String>; N]) -> String {
    let joined = fields
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
    format!("{label} {joined}")
}

/// Retrieval-grounded prompt for diet questions; generic friendly prompt
/// otherwise. The classifier picks, not the caller.
pub fn build_chat_prompt(question: &str, context: &str, user_context: &str) -> String {
    if is_diet_related(question) {
        [
            "You are a diet and nutrition assistant.",
            "Use only the provided context to answer the user's question.",
            "If the context does not contain the answer, say you don't know.",
            "Keep answers concise and practical.",
            "",
            "User Context:",
            user_context,
            "",
            "Context:",
            context,
            "",
            &format!("Question: {question}"),
        ]
        .join("\n")
    } else {
        build_chit_chat_prompt(question)
    }
}

fn build_chit_chat_prompt(question: &str) -> String {
    [
        "You are a friendly, concise assistant.",
        "If the user is just greeting or chatting, respond politely and briefly.",
        "Gently invite them to ask about diet, nutrition, or their health goals.",
        "answer the chat using indonesian language first.",
        "",
        &format!("User: {question}"),
    ]
    .join("\n")
}

pub fn build_recommendation_prompt(question: &str, context: &str, user_context: &str) -> String {
    [
        "You are a diet and nutrition coach.",
        "Give practical, safe, and personalized recommendations.",
        "Use the user context and the provided references.",
        "If information is missing, say what you need.",
        "",
        "User Context:",
        user_context,
        "",
        "References:",
        context,
        "",
        &format!("Question: {question}"),
    ]
    .join("\n")
}
