use std::sync::Arc;

use parking_lot::RwLock;

use crosslink_protocol::{FieldDef, FieldDraft, FieldOptions};
use crosslink_store::Store;

use crate::error::ServiceError;

/// Named attributes offered to rule authors. Names are unique and fixed once
/// registered.
pub struct FieldRegistry {
    fields: RwLock<Vec<FieldDef>>,
    store: Arc<dyn Store>,
}

impl FieldRegistry {
    pub fn load(store: Arc<dyn Store>) -> Result<Self, ServiceError> {
        let fields = store.load_fields()?;
        Ok(Self {
            fields: RwLock::new(fields),
            store,
        })
    }

    pub fn list(&self) -> Vec<FieldDef> {
        self.fields.read().clone()
    }

    pub fn options(&self) -> FieldOptions {
        FieldOptions::default()
    }

    pub fn configure(&self, draft: FieldDraft) -> Result<Vec<FieldDef>, ServiceError> {
        let field = FieldDef {
            field_name: required("field_name", &draft.field_name)?,
            field_type: required("type", &draft.field_type)?,
            description: draft.description.trim().to_string(),
            is_active: true,
        };
        self.mutate(|fields| {
            if fields.iter().any(|f| f.field_name == field.field_name) {
                return Err(ServiceError::validation(format!(
                    "field '{}' already exists",
                    field.field_name
                )));
            }
            fields.push(field);
            Ok(())
        })
    }

    /// Replace type, description and active flag of an existing field.
    pub fn edit(&self, edit: FieldDef) -> Result<Vec<FieldDef>, ServiceError> {
        let name = required("field_name", &edit.field_name)?;
        let field_type = required("type", &edit.field_type)?;
        self.mutate(|fields| {
            let slot = fields
                .iter_mut()
                .find(|f| f.field_name == name)
                .ok_or_else(|| ServiceError::not_found(format!("field '{name}' not found")))?;
            slot.field_type = field_type;
            slot.description = edit.description.trim().to_string();
            slot.is_active = edit.is_active;
            Ok(())
        })
    }

    pub fn delete(&self, field_name: &str) -> Result<Vec<FieldDef>, ServiceError> {
        let name = required("field_name", field_name)?;
        self.mutate(|fields| {
            let pos = fields
                .iter()
                .position(|f| f.field_name == name)
                .ok_or_else(|| ServiceError::not_found(format!("field '{name}' not found")))?;
            fields.remove(pos);
            Ok(())
        })
    }

    fn mutate(
        &self,
        f: impl FnOnce(&mut Vec<FieldDef>) -> Result<(), ServiceError>,
    ) -> Result<Vec<FieldDef>, ServiceError> {
        let mut guard = self.fields.write();
        let mut next = guard.clone();
        f(&mut next)?;
        self.store.save_fields(&next)?;
        *guard = next;
        Ok(guard.clone())
    }
}

fn required(key: &str, value: &str) -> Result<String, ServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::validation(format!("{key} is required")));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosslink_protocol::ErrorKind;
    use crosslink_store::MemoryStore;

    fn draft(name: &str, ty: &str) -> FieldDraft {
        FieldDraft {
            field_name: name.into(),
            field_type: ty.into(),
            description: String::new(),
        }
    }

    fn registry() -> FieldRegistry {
        FieldRegistry::load(Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn names_are_unique() {
        let reg = registry();
        reg.configure(draft("email", "string")).unwrap();
        let err = reg.configure(draft(" email ", "string")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(reg.list().len(), 1);
    }

    #[test]
    fn required_keys() {
        let reg = registry();
        assert!(reg.configure(draft("", "string")).is_err());
        assert!(reg.configure(draft("email", " ")).is_err());
        assert!(reg.list().is_empty());
    }

    #[test]
    fn edit_keeps_name() {
        let reg = registry();
        reg.configure(draft("amount", "string")).unwrap();
        let fields = reg
            .edit(FieldDef {
                field_name: "amount".into(),
                field_type: "number".into(),
                description: "settled amount".into(),
                is_active: false,
            })
            .unwrap();
        assert_eq!(fields[0].field_type, "number");
        assert!(!fields[0].is_active);

        let err = reg
            .edit(FieldDef {
                field_name: "total".into(),
                field_type: "number".into(),
                description: String::new(),
                is_active: true,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn delete_missing_is_not_found() {
        let reg = registry();
        reg.configure(draft("email", "string")).unwrap();
        assert_eq!(reg.delete("phone").unwrap_err().kind(), ErrorKind::NotFound);
        assert!(reg.delete("email").unwrap().is_empty());
    }
}
