//! Test utilities & fixtures.
//! A small but complete document set covering all fourteen collections.
#![allow(dead_code)]

use std::path::Path;

use mudmigrate::config::Config;
use mudmigrate::entities::{self, EntityDef};
use serde_json::{json, Value};

/// Documents per collection, as they would appear in `<data_dir>/<collection>.json`.
pub fn sample_collections() -> Vec<(&'static str, Value)> {
    vec![
        (
            "users",
            json!([
                {
                    "username": "alice",
                    "passwordHash": "$argon2id$v=19$abc",
                    "email": "alice@example.com",
                    "level": 4,
                    "experience": 1200,
                    "currency": {"gold": 3, "silver": 14, "copper": 9},
                    "inventory": ["inst-1"],
                    "equipment": {"weapon": "inst-1"},
                    "isAdmin": true,
                    "createdAt": "2024-03-01T12:00:00.000Z",
                    "lastLogin": "2024-06-01T08:30:00.000Z"
                },
                {
                    "username": "bob",
                    "currentRoomId": "market",
                    "health": 42,
                    "inCombat": true,
                    "combatTarget": "goblin"
                },
                {
                    "username": "carol",
                    "email": "carol@example.com",
                    "flags": {"tutorial": "done"}
                }
            ]),
        ),
        (
            "rooms",
            json!([
                {
                    "id": "town_square",
                    "name": "Town Square",
                    "description": "A bustling square.",
                    "areaId": "town",
                    "exits": [{"direction": "north", "roomId": "market"}],
                    "npcTemplateIds": ["guard"],
                    "isSafe": true,
                    "mapX": 0, "mapY": 0, "mapZ": 0
                },
                {
                    "id": "market",
                    "name": "Market",
                    "exits": [{"direction": "south", "roomId": "town_square"}],
                    "currency": {"gold": 0, "silver": 2, "copper": 0},
                    "mapY": 1
                }
            ]),
        ),
        (
            "npc_templates",
            json!([
                {"id": "guard", "name": "Town Guard", "level": 5, "damage": [2, 6], "merchant": false},
                {"id": "goblin", "name": "Goblin", "aggressive": true, "lootTable": [{"itemId": "dagger", "chance": 0.25}]}
            ]),
        ),
        (
            "item_templates",
            json!([
                {"id": "dagger", "name": "Dagger", "type": "weapon", "slot": "weapon", "weight": 1.5, "value": 12, "stats": {"damage": 3}}
            ]),
        ),
        (
            "item_instances",
            json!([
                {
                    "instanceId": "inst-1",
                    "templateId": "dagger",
                    "ownerId": "alice",
                    "durability": 87,
                    "createdAt": "2024-03-02T09:00:00.000Z",
                    "history": [{"event": "crafted", "timestamp": "2024-03-02T09:00:00.000Z", "by": "alice"}]
                }
            ]),
        ),
        (
            "areas",
            json!([
                {"id": "town", "name": "Town", "roomIds": ["town_square", "market"], "maxLevel": 5}
            ]),
        ),
        (
            "abilities",
            json!([
                {"id": "fireball", "name": "Fireball", "type": "spell", "manaCost": 10, "power": 25, "effects": [{"type": "burn", "turns": 2}]}
            ]),
        ),
        (
            "room_states",
            json!([
                {"roomId": "market", "items": ["inst-9"], "npcs": [{"templateId": "guard", "health": 80}], "lastUpdated": "2024-06-01T08:00:00.000Z"}
            ]),
        ),
        (
            "merchant_states",
            json!([
                {"npcTemplateId": "guard", "roomId": "market", "inventory": [{"itemId": "dagger", "stock": 3}], "currency": {"gold": 10, "silver": 0, "copper": 0}}
            ]),
        ),
        ("admins", json!(["root", {"username": "alice", "role": "moderator", "addedBy": "root", "permissions": ["kick"]}])),
        (
            "bug_reports",
            json!([
                {"id": "bug-1", "reporter": "bob", "description": "Door is stuck", "roomId": "market", "createdAt": "2024-05-05T10:00:00.000Z"}
            ]),
        ),
        (
            "snake_scores",
            json!([
                {"username": "alice", "score": 120, "achievedAt": "2024-04-01T00:00:00.000Z"},
                {"username": "bob", "score": 45}
            ]),
        ),
        (
            "mud_config",
            json!({"name": "Test MUD", "maxPlayers": 20, "experienceMultiplier": 1.5, "settings": {"theme": "dark"}}),
        ),
        ("game_timer_config", json!({"tickIntervalMs": 500, "enabled": true})),
    ]
}

/// Write the sample collections into `dir`.
pub fn write_sample_documents(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    for (collection, docs) in sample_collections() {
        std::fs::write(
            dir.join(format!("{collection}.json")),
            serde_json::to_string_pretty(&docs).unwrap(),
        )
        .unwrap();
    }
}

/// Record count per collection as written by [`write_sample_documents`].
pub fn sample_count(collection: &str) -> usize {
    sample_collections()
        .into_iter()
        .find(|(name, _)| *name == collection)
        .map(|(_, docs)| match docs {
            Value::Array(items) => items.len(),
            _ => 1,
        })
        .unwrap_or(0)
}

/// A configuration rooted entirely inside `root`.
pub fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = root.join("data").to_string_lossy().into_owned();
    config.storage.sqlite_path = Some(root.join("db").join("mud.db").to_string_lossy().into_owned());
    config.backup.dir = root.join("backups").to_string_lossy().into_owned();
    config
}

/// Every document of `def` in `dir`, normalised and sorted by record id.
pub fn read_normalized(dir: &Path, def: &EntityDef) -> Vec<Value> {
    let path = dir.join(def.file_name());
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    let parsed: Value = serde_json::from_str(&content).unwrap();
    let docs = match parsed {
        Value::Array(items) => items,
        other => vec![other],
    };
    let mut out: Vec<Value> = docs.iter().map(|d| def.with_defaults(d)).collect();
    out.sort_by_key(|d| def.record_id(d));
    out
}

pub fn entity(name: &str) -> &'static EntityDef {
    entities::find(name).unwrap()
}
