//! The embedded configuration page.
//!
//! A single self-contained HTML document served at `/webconfig`. It lists
//! nearby networks (tap one to fill the SSID field), posts the chosen
//! credentials as JSON to `/wc` and shows the device's verdict. The fetch
//! targets are the fixed softAP gateway address so the page works no matter
//! what hostname the captive redirect arrived under.

pub const CONFIG_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>WiFi Setup</title>
    <style>
        body {
            display: flex;
            flex-direction: column;
            align-items: center;
            justify-content: center;
            min-height: 100vh;
            margin: 0;
            font-family: Arial, sans-serif;
            background-color: #1a1a1a;
            color: #ffffff;
            padding: 20px;
            box-sizing: border-box;
        }
        .input-group {
            margin: 10px 0;
            text-align: center;
            width: 100%;
            max-width: 300px;
        }
        input {
            padding: 8px;
            width: 100%;
            max-width: 300px;
            background-color: #2d2d2d;
            border: 1px solid #404040;
            color: #ffffff;
            border-radius: 4px;
            box-sizing: border-box;
            font-size: 16px;
        }
        input::placeholder {
            color: #888888;
        }
        .button-group {
            display: flex;
            gap: 10px;
            width: 100%;
            max-width: 300px;
            justify-content: center;
            margin: 15px 0;
        }
        button {
            padding: 10px 25px;
            background-color: #404040;
            color: #ffffff;
            border: none;
            border-radius: 4px;
            cursor: pointer;
            font-size: 16px;
            flex: 1;
        }
        button:hover {
            background-color: #505050;
        }
        #wifiList {
            list-style: none;
            padding: 0;
            max-height: 250px;
            overflow-y: auto;
            width: 100%;
            max-width: 300px;
            background-color: #2d2d2d;
            border: 1px solid #404040;
            border-radius: 4px;
        }
        #wifiList li {
            padding: 10px;
            cursor: pointer;
            text-align: center;
            border-bottom: 1px solid #404040;
            font-size: 16px;
        }
        #wifiList li:last-child {
            border-bottom: none;
        }
        #wifiList li:hover {
            background-color: #383838;
        }
    </style>
</head>
<body>
    <div class="input-group">
        <input type="text" id="ssid" placeholder="Network name">
    </div>
    <div class="input-group">
        <input type="password" id="password" placeholder="Password">
    </div>
    <div class="button-group">
        <button onclick="configureWifi()">Connect</button>
        <button onclick="loadWifiList()">Rescan</button>
    </div>
    <ul id="wifiList"></ul>

    <script>
        function configureWifi() {
            const ssid = document.getElementById('ssid').value;
            const password = document.getElementById('password').value;

            fetch('http://192.168.4.1/wc', {
                method: 'POST',
                headers: {
                    'Content-Type': 'application/json'
                },
                body: JSON.stringify({ ssid: ssid, password: password })
            })
            .then(response => response.json())
            .then(data => {
                const wifiList = document.getElementById('wifiList');
                wifiList.innerHTML = '';
                const li = document.createElement('li');
                if (data.result === 'ok') {
                    li.textContent = 'Connected';
                } else {
                    li.textContent = 'Connection failed: ' + data.result;
                }
                wifiList.appendChild(li);
            })
            .catch(error => console.error('Error:', error));
        }

        function loadWifiList() {
            fetch('http://192.168.4.1/wl')
                .then(response => response.json())
                .then(data => {
                    data.sort((a, b) => b.rssi - a.rssi);
                    const wifiList = document.getElementById('wifiList');
                    wifiList.innerHTML = '';

                    data.forEach(wifi => {
                        const li = document.createElement('li');
                        li.textContent = wifi.ssid;
                        li.onclick = () => {
                            document.getElementById('ssid').value = wifi.ssid;
                        };
                        wifiList.appendChild(li);
                    });
                })
                .catch(error => console.error('Error:', error));
        }
        window.onload = loadWifiList;
    </script>
</body>
</html>"#;
