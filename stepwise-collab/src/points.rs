use crate::{CollabContext, PrimaryKey, RoomError};

/// Keeps the score of every user in every room
pub struct PointsLedger {
    context: CollabContext,
}

impl PointsLedger {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Returns the points of a user in a room, 0 if none were ever set
    pub async fn get_points(
        &self,
        user_id: PrimaryKey,
        room_id: PrimaryKey,
    ) -> Result<i64, RoomError> {
        let user = self.context.database.user_by_id(user_id).await?;
        Ok(user.points_in(&room_id.to_string()))
    }

    /// Overwrites the points of a user in a room, returning the new value
    pub async fn set_points(
        &self,
        user_id: PrimaryKey,
        room_id: PrimaryKey,
        points: i64,
    ) -> Result<i64, RoomError> {
        let points = self
            .context
            .database
            .set_user_points(user_id, &room_id.to_string(), points)
            .await?;

        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_user, test_collab};
    use crate::Role;

    #[tokio::test]
    async fn points_default_to_zero() {
        let t = test_collab();
        let user = create_user(&t, "user", Role::Participant).await;

        assert_eq!(t.collab.points.get_points(user.id, 12).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn the_last_write_wins() {
        let t = test_collab();
        let user = create_user(&t, "user", Role::Participant).await;

        for points in [5, 3, -2, 40] {
            assert_eq!(
                t.collab.points.set_points(user.id, 1, points).await.unwrap(),
                points
            );
        }

        assert_eq!(t.collab.points.get_points(user.id, 1).await.unwrap(), 40);
        assert_eq!(t.collab.points.get_points(user.id, 2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_users_have_no_points() {
        let t = test_collab();

        let result = t.collab.points.get_points(404, 1).await;
        assert!(matches!(result, Err(RoomError::NotFound { .. })));
    }
}
