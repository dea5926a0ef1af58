use std::sync::Arc;

#[derive(Clone)]
pub struct AdminService {
    admin_ids: Arc<Vec<i64>>,
}

impl AdminService {
    pub fn new(admin_ids: Vec<i64>) -> Self {
        Self {
            admin_ids: Arc::new(admin_ids),
        }
    }

    pub fn is_admin(&self, tg_id: i64) -> bool {
        self.admin_ids.contains(&tg_id)
    }

    pub fn admin_ids(&self) -> &[i64] {
        &self.admin_ids
    }
}
