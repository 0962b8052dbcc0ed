//! Response-shaping layer: representation resolution, field selection,
//! pagination, and the geo distance filter.

pub mod fields;
pub mod geo;
pub mod pagination;
pub mod resolver;

use resolver::{Action, Projection, ViewRegistry};

/// Registries for every exposed resource, built once at startup.
pub struct Views {
    pub files: ViewRegistry,
    pub contents: ViewRegistry,
}

/// Default projection tables.
///
/// Files: the public shape is minimal; owners of a record see its target
/// wiring; admins additionally see the raw backend response. The create
/// action echoes the full record back to the uploader.
pub fn default_views() -> Views {
    let file_owner = Projection::new([
        "id",
        "name",
        "content_type",
        "url",
        "content_key",
        "content_field",
        "object_id",
        "owner_id",
        "created_at",
        "updated_at",
    ]);

    let files = ViewRegistry::new(
        Projection::new(["id", "name", "url", "created_at"]),
        ["owner_id"],
    )
    .admin(Projection::new([
        "id",
        "name",
        "content_type",
        "url",
        "upload_resp",
        "content_key",
        "content_field",
        "object_id",
        "owner_id",
        "created_at",
        "updated_at",
    ]))
    .owner(Action::Retrieve, file_owner.clone())
    .owner(Action::Update, file_owner.clone())
    .action(Action::Create, file_owner);

    let contents = ViewRegistry::new(
        Projection::new([
            "id",
            "content_key",
            "name",
            "latitude",
            "longitude",
            "created_at",
            "distance",
            "links",
        ]),
        ["owner_id"],
    )
    .admin(Projection::new([
        "id",
        "content_key",
        "name",
        "owner_id",
        "latitude",
        "longitude",
        "created_at",
        "distance",
        "links",
    ]));

    Views { files, contents }
}
