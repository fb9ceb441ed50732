use lazy_static::lazy_static;
use log::info;
use regex::Regex;

use crate::{
    ai::bounded, CollabContext, PrimaryKey, Profile, RoomError, Step, StepSetKey, UpdatedRoom,
};

lazy_static! {
    static ref ORDINAL_REGEX: Regex = Regex::new(r"^\s*\d+\.(\s+|$)").unwrap();
}

/// Has the AI service rewrite the default instructions of a room for one user
pub struct DescriptionGenerator {
    context: CollabContext,
}

impl DescriptionGenerator {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Generates steps for `target_user_id` from the default steps of a room and the user's profile,
    /// replacing any steps the user had.
    ///
    /// Images are carried over by position, from the user's previous step or else the default one.
    /// Nothing is written unless generation succeeds.
    pub async fn generate_personalized_steps(
        &self,
        room_id: PrimaryKey,
        target_user_id: PrimaryKey,
        requester: PrimaryKey,
    ) -> Result<Vec<Step>, RoomError> {
        let room = self.context.room_owned_by(room_id, requester).await?;
        let user = self.context.database.user_by_id(target_user_id).await?;

        let base = base_description(room.steps.default_steps());
        let profile = profile_context(&user.profile);

        let limit = self.context.config.generation_timeout;
        let text = bounded(limit, self.context.ai.generate(&base, &profile))
            .await
            .map_err(|e| RoomError::GenerationFailed(e.to_string()))?;

        let descriptions = parse_descriptions(&text);
        if descriptions.is_empty() {
            return Err(RoomError::GenerationFailed(
                "The AI service returned no instructions".to_string(),
            ));
        }

        let key = StepSetKey::User(target_user_id);
        let previous = room.steps.get(key).unwrap_or(&[]);
        let defaults = room.steps.default_steps();

        let steps: Vec<_> = descriptions
            .into_iter()
            .enumerate()
            .map(|(i, description)| {
                let image_urls = previous
                    .get(i)
                    .or_else(|| defaults.get(i))
                    .map(|s| s.image_urls.clone())
                    .unwrap_or_default();

                Step::new(description, image_urls)
            })
            .collect();

        let mut step_set = room.steps;
        step_set.set(key, steps.clone());

        self.context
            .database
            .update_room(UpdatedRoom {
                id: room_id,
                steps: Some(step_set),
                ..Default::default()
            })
            .await?;

        info!(
            "Generated {} steps for user {} in room {}",
            steps.len(),
            target_user_id,
            room_id
        );

        Ok(steps)
    }
}

/// Renders steps as a numbered list, one per line
fn base_description(steps: &[Step]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn profile_context(profile: &Profile) -> String {
    format!(
        "Disability type: {}, disability level: {}, notes: {}",
        profile.disability_type.as_deref().unwrap_or("unknown"),
        profile.disability_level.as_deref().unwrap_or("unknown"),
        profile
            .notes
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("none")
    )
}

/// Splits generated text into one description per non-blank line, without leading ordinals
fn parse_descriptions(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| ORDINAL_REGEX.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_user, test_collab, Generation};
    use crate::{Role, StepSet};

    fn image(name: &str) -> Vec<String> {
        vec![format!("/uploads/{}.png", name)]
    }

    #[test]
    fn base_descriptions_are_numbered() {
        let steps = [Step::new("Open the lid", vec![]), Step::new("Insert the part", vec![])];
        assert_eq!(base_description(&steps), "1. Open the lid\n2. Insert the part");
    }

    #[test]
    fn missing_notes_get_a_placeholder() {
        let profile = Profile {
            disability_type: Some("intellectual".to_string()),
            disability_level: Some("2".to_string()),
            ..Default::default()
        };

        assert_eq!(
            profile_context(&profile),
            "Disability type: intellectual, disability level: 2, notes: none"
        );
    }

    #[test]
    fn ordinals_and_blank_lines_are_dropped() {
        let text = "1. Open the lid\n\n  2. Insert the part  \nPress start\n10. Wait\n11.";

        assert_eq!(
            parse_descriptions(text),
            vec!["Open the lid", "Insert the part", "Press start", "Wait"]
        );
    }

    #[test]
    fn leading_decimals_are_not_ordinals() {
        let text = "1. Cut the wire\n2.5 mm of insulation stays on\n3. Done";

        assert_eq!(
            parse_descriptions(text),
            vec!["Cut the wire", "2.5 mm of insulation stays on", "Done"]
        );
    }

    #[tokio::test]
    async fn images_are_carried_over_by_position() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;
        let user = create_user(&t, "user", Role::Participant).await;
        let room = t.collab.rooms.create_room("Lab", None, admin.id).await.unwrap();

        let mut steps = StepSet::new();
        steps.set(
            StepSetKey::Default,
            vec![
                Step::new("A", image("default-0")),
                Step::new("B", image("default-1")),
                Step::new("C", image("default-2")),
            ],
        );
        steps.set(StepSetKey::User(user.id), vec![Step::new("X", image("user-0"))]);
        t.collab
            .rooms
            .replace_step_set(room.id, admin.id, steps)
            .await
            .unwrap();

        t.ai.respond_with(Generation::Text("1. First\n2. Second\n3. Third\n4. Fourth".into()));

        let generated = t
            .collab
            .descriptions
            .generate_personalized_steps(room.id, user.id, admin.id)
            .await
            .unwrap();

        assert_eq!(
            generated,
            vec![
                Step::new("First", image("user-0")),
                Step::new("Second", image("default-1")),
                Step::new("Third", image("default-2")),
                Step::new("Fourth", vec![]),
            ]
        );

        let (base, profile) = t.ai.last_request().unwrap();
        assert_eq!(base, "1. A\n2. B\n3. C");
        assert!(profile.starts_with("Disability type:"));

        let viewed = t.collab.rooms.steps_for_viewer(room.id, user.id).await.unwrap();
        assert_eq!(viewed, generated);

        let room = t.collab.rooms.room_with_members(room.id).await.unwrap();
        assert_eq!(room.steps.default_steps().len(), 3);
    }

    #[tokio::test]
    async fn failed_generation_writes_nothing() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;
        let user = create_user(&t, "user", Role::Participant).await;
        let room = t.collab.rooms.create_room("Lab", None, admin.id).await.unwrap();

        for generation in [Generation::Fail, Generation::Hang, Generation::Text("\n \n".into())] {
            t.ai.respond_with(generation);

            let result = t
                .collab
                .descriptions
                .generate_personalized_steps(room.id, user.id, admin.id)
                .await;

            assert!(matches!(result, Err(RoomError::GenerationFailed(_))));
        }

        let room = t.collab.rooms.room_with_members(room.id).await.unwrap();
        assert_eq!(room.steps, StepSet::new());
    }

    #[tokio::test]
    async fn only_the_creator_may_generate() {
        let t = test_collab();
        let admin = create_user(&t, "admin", Role::Admin).await;
        let user = create_user(&t, "user", Role::Participant).await;
        let room = t.collab.rooms.create_room("Lab", None, admin.id).await.unwrap();

        let result = t
            .collab
            .descriptions
            .generate_personalized_steps(room.id, user.id, user.id)
            .await;
        assert!(matches!(result, Err(RoomError::NotCreator)));

        let result = t
            .collab
            .descriptions
            .generate_personalized_steps(room.id, 404, admin.id)
            .await;
        assert!(matches!(result, Err(RoomError::NotFound { .. })));

        assert!(t.ai.last_request().is_none());
    }
}
