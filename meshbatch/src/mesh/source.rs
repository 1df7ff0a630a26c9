use std::sync::Arc;

use super::{EditMesh, Mesh, MeshWrapper};

/// Evaluated data available while an object is in edit mode
#[derive(Clone, Debug)]
pub struct EditSource {
    /// Live editable mesh
    pub bm: Arc<EditMesh>,
    /// Evaluated mesh drawn as the editing cage
    pub cage: Arc<Mesh>,
    /// Fully evaluated mesh
    ///
    /// This may be the same object as `cage`; identity is checked with
    /// [`Arc::ptr_eq`].
    pub eval_final: Arc<Mesh>,
}

/// Every representation of one mesh object that exists right now
#[derive(Clone, Debug)]
pub struct MeshSource {
    /// Mesh drawn in object mode
    pub mesh: Arc<Mesh>,
    /// Edit-mode data, present only while editing
    pub edit: Option<EditSource>,
}

impl MeshSource {
    /// Builds a source for an object that is not being edited
    pub fn object(mesh: Mesh) -> Self {
        Self {
            mesh: Arc::new(mesh),
            edit: None,
        }
    }

    /// Builds a source for an object in edit mode with no modifiers
    ///
    /// The cage and final meshes are a single wrapper around the editable
    /// mesh, so extraction reads the editable mesh directly.
    pub fn edit(bm: EditMesh) -> Self {
        let wrapper = Arc::new(Mesh {
            wrapper: MeshWrapper::Edit { vertex_cos: None },
            is_original: false,
            ..Mesh::default()
        });
        Self {
            mesh: wrapper.clone(),
            edit: Some(EditSource {
                bm: Arc::new(bm),
                cage: wrapper.clone(),
                eval_final: wrapper,
            }),
        }
    }

    /// Builds a source for an object in edit mode with evaluated meshes
    pub fn edit_evaluated(
        bm: EditMesh,
        cage: Arc<Mesh>,
        eval_final: Arc<Mesh>,
    ) -> Self {
        Self {
            mesh: eval_final.clone(),
            edit: Some(EditSource {
                bm: Arc::new(bm),
                cage,
                eval_final,
            }),
        }
    }

    /// Checks whether the object is in edit mode
    pub fn is_editmode(&self) -> bool {
        self.edit.is_some()
    }

    /// Number of material slots
    pub fn mat_len(&self) -> usize {
        let me = match &self.edit {
            Some(e) => &e.eval_final,
            None => &self.mesh,
        };
        let editable = self.edit.as_ref().map(|e| {
            let bm = &e.bm;
            (0..bm.face_len())
                .map(|f| bm.face(super::FaceId::new(f)).mat as usize + 1)
                .max()
                .unwrap_or(1)
        });
        match (&me.wrapper, editable) {
            (MeshWrapper::Edit { .. }, Some(n)) => n,
            _ => me.mat_len.max(1) as usize,
        }
    }
}
