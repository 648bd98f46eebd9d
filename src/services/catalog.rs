use crate::{
    domain::{Category, ListParams, ListSpec, NamedInput, Page, Permission, Role},
    errors::ApiError,
    repository::{CatalogRepository, PermissionRepository},
};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// A named catalog record: categories, permissions and roles.
pub trait CatalogEntry: Clone + Send + Sync + 'static {
    const LABEL: &'static str;

    fn create(name: String, description: Option<String>, now: OffsetDateTime) -> Self;

    /// Query keys accepted by the collection endpoint.
    fn listing() -> &'static ListSpec;

    fn name(&self) -> &str;

    fn set_name(&mut self, name: String);

    fn set_description(&mut self, description: Option<String>);

    /// Permission ids granted by the record, for records that carry them.
    fn permissions_mut(&mut self) -> Option<&mut Vec<Uuid>> {
        None
    }
}

macro_rules! plain_entry {
    ($entity:ident, $label:literal) => {
        impl CatalogEntry for $entity {
            const LABEL: &'static str = $label;

            fn create(name: String, description: Option<String>, now: OffsetDateTime) -> Self {
                Self {
                    id: Uuid::new_v4(),
                    name,
                    description,
                    created_at: now,
                }
            }

            fn listing() -> &'static ListSpec {
                &Self::LISTING
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn set_name(&mut self, name: String) {
                self.name = name;
            }

            fn set_description(&mut self, description: Option<String>) {
                self.description = description;
            }
        }
    };
}

plain_entry!(Category, "Category");
plain_entry!(Permission, "Permission");

impl CatalogEntry for Role {
    const LABEL: &'static str = "Role";

    fn create(name: String, description: Option<String>, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            permissions: Vec::new(),
            created_at: now,
        }
    }

    fn listing() -> &'static ListSpec {
        &Self::LISTING
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    fn permissions_mut(&mut self) -> Option<&mut Vec<Uuid>> {
        Some(&mut self.permissions)
    }
}

pub struct CatalogService<T> {
    items: Arc<dyn CatalogRepository<T>>,
    permissions: Arc<PermissionRepository>,
}

impl<T> Clone for CatalogService<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            permissions: self.permissions.clone(),
        }
    }
}

impl<T: CatalogEntry> CatalogService<T> {
    pub fn new(items: Arc<dyn CatalogRepository<T>>, permissions: Arc<PermissionRepository>) -> Self {
        Self { items, permissions }
    }

    #[tracing::instrument(name = "Create catalog entry", skip_all, fields(kind = T::LABEL))]
    pub async fn create(&self, input: NamedInput) -> Result<T, ApiError> {
        let name = input
            .required_name()
            .map_err(|msg| ApiError::validation("name", msg))?;
        self.ensure_unique(&name).await?;

        let mut item = T::create(name, input.description, OffsetDateTime::now_utc());
        self.assign_permissions(&mut item, input.permissions).await?;
        self.items.insert(&item).await?;

        Ok(item)
    }

    #[tracing::instrument(name = "Update catalog entry", skip(self, input), fields(kind = T::LABEL))]
    pub async fn update(&self, id: Uuid, input: NamedInput) -> Result<T, ApiError> {
        let mut item = self.get(id).await?;

        if let Some(name) = input
            .name()
            .map_err(|msg| ApiError::validation("name", msg))?
        {
            if name != item.name() {
                self.ensure_unique(&name).await?;
            }
            item.set_name(name);
        }
        if input.description.is_some() {
            item.set_description(input.description);
        }
        self.assign_permissions(&mut item, input.permissions).await?;
        self.items.update(&item).await?;

        Ok(item)
    }

    #[tracing::instrument(name = "Get catalog entry", skip(self), fields(kind = T::LABEL))]
    pub async fn get(&self, id: Uuid) -> Result<T, ApiError> {
        self.items
            .find(id)
            .await?
            .ok_or_else(|| ApiError::not_found(T::LABEL))
    }

    #[tracing::instrument(name = "List catalog entries", skip(self), fields(kind = T::LABEL))]
    pub async fn list(&self, params: &ListParams) -> Result<Page<T>, ApiError> {
        Ok(self.items.list(params).await?)
    }

    #[tracing::instrument(name = "Delete catalog entry", skip(self), fields(kind = T::LABEL))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        if self.items.delete(id).await? {
            Ok(())
        } else {
            Err(ApiError::not_found(T::LABEL))
        }
    }

    async fn ensure_unique(&self, name: &str) -> Result<(), ApiError> {
        match self.items.find_by_name(name).await? {
            Some(_) => Err(ApiError::rule(
                name,
                format!("{} `{name}` already exists.", T::LABEL),
            )),
            None => Ok(()),
        }
    }

    async fn assign_permissions(
        &self,
        item: &mut T,
        ids: Option<Vec<Uuid>>,
    ) -> Result<(), ApiError> {
        let Some(ids) = ids else {
            return Ok(());
        };
        let Some(granted) = item.permissions_mut() else {
            return Err(ApiError::validation(
                "permissions",
                format!("{} does not carry permissions.", T::LABEL),
            ));
        };

        let mut checked = Vec::with_capacity(ids.len());
        for id in ids {
            if self.permissions.find(id).await?.is_none() {
                return Err(ApiError::validation(
                    id.to_string(),
                    "Permission does not exist.",
                ));
            }
            if !checked.contains(&id) {
                checked.push(id);
            }
        }
        *granted = checked;

        Ok(())
    }
}
