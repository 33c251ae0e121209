//! Editor command catalogue.
//!
//! Every command the automation agent may issue has a typed argument struct.
//! [`EditorCommand::parse`] deserializes and validates arguments so that a
//! malformed call is rejected before anything is broadcast to the editor.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::CommandError;

/// Default page size for `list-paged-model`.
const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page `list-paged-model` accepts.
const MAX_PAGE_SIZE: u32 = 1000;

/// Arguments of `add-rectangle`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddRectangle {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width, must be positive.
    pub width: f64,
    /// Height, must be positive.
    pub height: f64,
    /// Label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Editor style string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Arguments of `add-edge`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddEdge {
    /// Source cell.
    pub source_id: String,
    /// Target cell.
    pub target_id: String,
    /// Label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Editor style string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Arguments naming a single cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CellRef {
    /// Target cell.
    pub cell_id: String,
}

/// Arguments of `edit-cell`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EditCell {
    /// Vertex to edit.
    pub cell_id: String,
    /// New label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// New left edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// New top edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// New width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// New height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// New style string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Arguments of `edit-edge`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EditEdge {
    /// Edge to edit.
    pub cell_id: String,
    /// New label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// New source cell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// New target cell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// New style string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Arguments of `add-cell-of-shape`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddCellOfShape {
    /// Library shape name.
    pub shape_name: String,
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Height override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Extra style appended to the shape's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Arguments of `set-cell-shape`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetCellShape {
    /// Target cell.
    pub cell_id: String,
    /// Library shape name.
    pub shape_name: String,
}

/// Arguments of `set-cell-data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetCellData {
    /// Target cell.
    pub cell_id: String,
    /// Attribute name.
    pub key: String,
    /// Attribute value.
    pub value: Value,
}

/// Arguments of `get-shapes-in-category`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CategoryRef {
    /// Shape library category.
    pub category_id: String,
}

/// Arguments of `get-shape-by-name`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ShapeRef {
    /// Library shape name.
    pub shape_name: String,
}

/// Arguments of `list-paged-model`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListPagedModel {
    /// Zero-based page index.
    #[serde(default)]
    pub page: u32,
    /// Cells per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Opaque filter forwarded to the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Commands without arguments.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

/// A validated command ready for the bus.
#[derive(Clone, Debug, PartialEq)]
pub enum EditorCommand {
    /// `add-rectangle`
    AddRectangle(AddRectangle),
    /// `add-edge`
    AddEdge(AddEdge),
    /// `delete-cell-by-id`
    DeleteCellById(CellRef),
    /// `edit-cell`
    EditCell(EditCell),
    /// `edit-edge`
    EditEdge(EditEdge),
    /// `get-selected-cell`
    GetSelectedCell(NoArgs),
    /// `add-cell-of-shape`
    AddCellOfShape(AddCellOfShape),
    /// `set-cell-shape`
    SetCellShape(SetCellShape),
    /// `set-cell-data`
    SetCellData(SetCellData),
    /// `get-shape-categories`
    GetShapeCategories(NoArgs),
    /// `get-shapes-in-category`
    GetShapesInCategory(CategoryRef),
    /// `get-shape-by-name`
    GetShapeByName(ShapeRef),
    /// `list-paged-model`
    ListPagedModel(ListPagedModel),
}

impl EditorCommand {
    /// Every command name in the catalogue.
    pub const NAMES: &'static [&'static str] = &[
        "add-rectangle",
        "add-edge",
        "delete-cell-by-id",
        "edit-cell",
        "edit-edge",
        "get-selected-cell",
        "add-cell-of-shape",
        "set-cell-shape",
        "set-cell-data",
        "get-shape-categories",
        "get-shapes-in-category",
        "get-shape-by-name",
        "list-paged-model",
    ];

    /// Deserialize and validate arguments for `name`.
    ///
    /// A `null` argument value is treated as an empty object.
    pub fn parse(name: &str, args: Value) -> Result<Self, CommandError> {
        let args = if args.is_null() {
            Value::Object(Map::new())
        } else {
            args
        };

        let command = match name {
            "add-rectangle" => Self::AddRectangle(decode(name, args)?),
            "add-edge" => Self::AddEdge(decode(name, args)?),
            "delete-cell-by-id" => Self::DeleteCellById(decode(name, args)?),
            "edit-cell" => Self::EditCell(decode(name, args)?),
            "edit-edge" => Self::EditEdge(decode(name, args)?),
            "get-selected-cell" => Self::GetSelectedCell(decode(name, args)?),
            "add-cell-of-shape" => Self::AddCellOfShape(decode(name, args)?),
            "set-cell-shape" => Self::SetCellShape(decode(name, args)?),
            "set-cell-data" => Self::SetCellData(decode(name, args)?),
            "get-shape-categories" => Self::GetShapeCategories(decode(name, args)?),
            "get-shapes-in-category" => Self::GetShapesInCategory(decode(name, args)?),
            "get-shape-by-name" => Self::GetShapeByName(decode(name, args)?),
            "list-paged-model" => Self::ListPagedModel(decode(name, args)?),
            other => return Err(CommandError::UnknownCommand(other.to_owned())),
        };

        command
            .validate()
            .map_err(|message| CommandError::InvalidArguments {
                command: name.to_owned(),
                message,
            })?;
        Ok(command)
    }

    /// Wire name of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddRectangle(_) => "add-rectangle",
            Self::AddEdge(_) => "add-edge",
            Self::DeleteCellById(_) => "delete-cell-by-id",
            Self::EditCell(_) => "edit-cell",
            Self::EditEdge(_) => "edit-edge",
            Self::GetSelectedCell(_) => "get-selected-cell",
            Self::AddCellOfShape(_) => "add-cell-of-shape",
            Self::SetCellShape(_) => "set-cell-shape",
            Self::SetCellData(_) => "set-cell-data",
            Self::GetShapeCategories(_) => "get-shape-categories",
            Self::GetShapesInCategory(_) => "get-shapes-in-category",
            Self::GetShapeByName(_) => "get-shape-by-name",
            Self::ListPagedModel(_) => "list-paged-model",
        }
    }

    /// Arguments as the JSON payload broadcast to the editor.
    pub fn payload(&self) -> Value {
        let value = match self {
            Self::AddRectangle(a) => serde_json::to_value(a),
            Self::AddEdge(a) => serde_json::to_value(a),
            Self::DeleteCellById(a) => serde_json::to_value(a),
            Self::EditCell(a) => serde_json::to_value(a),
            Self::EditEdge(a) => serde_json::to_value(a),
            Self::GetSelectedCell(a) | Self::GetShapeCategories(a) => serde_json::to_value(a),
            Self::AddCellOfShape(a) => serde_json::to_value(a),
            Self::SetCellShape(a) => serde_json::to_value(a),
            Self::SetCellData(a) => serde_json::to_value(a),
            Self::GetShapesInCategory(a) => serde_json::to_value(a),
            Self::GetShapeByName(a) => serde_json::to_value(a),
            Self::ListPagedModel(a) => serde_json::to_value(a),
        };
        // Plain structs of strings, numbers and JSON values always serialize.
        value.unwrap_or_else(|_| Value::Object(Map::new()))
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::AddRectangle(a) => {
                finite("x", a.x)?;
                finite("y", a.y)?;
                positive("width", a.width)?;
                positive("height", a.height)
            }
            Self::AddEdge(a) => {
                non_empty("sourceId", &a.source_id)?;
                non_empty("targetId", &a.target_id)
            }
            Self::DeleteCellById(a) => non_empty("cellId", &a.cell_id),
            Self::EditCell(a) => {
                non_empty("cellId", &a.cell_id)?;
                for (field, v) in [("x", a.x), ("y", a.y)] {
                    if let Some(v) = v {
                        finite(field, v)?;
                    }
                }
                for (field, v) in [("width", a.width), ("height", a.height)] {
                    if let Some(v) = v {
                        positive(field, v)?;
                    }
                }
                let touched = a.text.is_some()
                    || a.x.is_some()
                    || a.y.is_some()
                    || a.width.is_some()
                    || a.height.is_some()
                    || a.style.is_some();
                if touched {
                    Ok(())
                } else {
                    Err("at least one field to edit is required".into())
                }
            }
            Self::EditEdge(a) => {
                non_empty("cellId", &a.cell_id)?;
                if a.text.is_none() && a.source_id.is_none() && a.target_id.is_none() && a.style.is_none() {
                    return Err("at least one field to edit is required".into());
                }
                Ok(())
            }
            Self::AddCellOfShape(a) => {
                non_empty("shapeName", &a.shape_name)?;
                finite("x", a.x)?;
                finite("y", a.y)?;
                for (field, v) in [("width", a.width), ("height", a.height)] {
                    if let Some(v) = v {
                        positive(field, v)?;
                    }
                }
                Ok(())
            }
            Self::SetCellShape(a) => {
                non_empty("cellId", &a.cell_id)?;
                non_empty("shapeName", &a.shape_name)
            }
            Self::SetCellData(a) => {
                non_empty("cellId", &a.cell_id)?;
                non_empty("key", &a.key)
            }
            Self::GetShapesInCategory(a) => non_empty("categoryId", &a.category_id),
            Self::GetShapeByName(a) => non_empty("shapeName", &a.shape_name),
            Self::ListPagedModel(a) => {
                if a.page_size == 0 || a.page_size > MAX_PAGE_SIZE {
                    return Err(format!("pageSize must be between 1 and {MAX_PAGE_SIZE}"));
                }
                Ok(())
            }
            Self::GetSelectedCell(_) | Self::GetShapeCategories(_) => Ok(()),
        }
    }
}

fn decode<T: DeserializeOwned>(name: &str, args: Value) -> Result<T, CommandError> {
    serde_json::from_value(args).map_err(|e| CommandError::InvalidArguments {
        command: name.to_owned(),
        message: e.to_string(),
    })
}

fn non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be empty"))
    } else {
        Ok(())
    }
}

fn finite(field: &str, value: f64) -> Result<(), String> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(format!("{field} must be a finite number"))
    }
}

fn positive(field: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(format!("{field} must be positive"))
    }
}
